//! Artifact store: the pipeline's idempotency oracle and completion markers.
//!
//! The working directory itself is the checkpoint. An artifact that satisfies
//! its existence predicate means "already done" and the producing stage is
//! skipped. Optionally, `strict_markers` additionally requires the stage's
//! completion marker, which is written only after the stage fully succeeded,
//! so a directory left behind by a crashed run is not mistaken for output.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::{Artifact, ArtifactKind};

/// Directory (relative to the working directory) holding pipeline bookkeeping.
pub const STATE_DIR: &str = ".cvforge";

/// Sub directory of [`STATE_DIR`] holding `<stage>.done` markers.
pub const MARKER_DIR: &str = "markers";

/// Relative path of the completion marker for `stage`.
pub fn marker_relative_path(stage: &str) -> PathBuf {
    PathBuf::from(STATE_DIR)
        .join(MARKER_DIR)
        .join(format!("{}.done", stage))
}

/// Answers "does artifact X already exist" by path inspection under a root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    strict_markers: bool,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore {
            root: root.into(),
            strict_markers: false,
        }
    }

    /// Require a completion marker next to every non-marker artifact.
    pub fn with_strict_markers(mut self, strict: bool) -> Self {
        self.strict_markers = strict;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute host path of an artifact.
    pub fn path_of(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(&artifact.path)
    }

    /// Existence predicate alone. A directory counts by mere presence.
    pub fn exists(&self, artifact: &Artifact) -> bool {
        let path = self.path_of(artifact);
        match artifact.kind {
            ArtifactKind::File | ArtifactKind::Marker => path.is_file(),
            ArtifactKind::Directory => path.is_dir(),
            ArtifactKind::NonEmptyDirectory => fs::read_dir(&path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false),
        }
    }

    /// Whether the stage producing `artifact` can be skipped.
    pub fn is_satisfied(&self, stage: &str, artifact: &Artifact) -> bool {
        if !self.exists(artifact) {
            return false;
        }
        if self.strict_markers && artifact.kind != ArtifactKind::Marker {
            return self.is_marked(stage);
        }
        true
    }

    pub fn is_marked(&self, stage: &str) -> bool {
        self.root.join(marker_relative_path(stage)).is_file()
    }

    /// Record that `stage` finished successfully.
    pub fn mark_complete(&self, stage: &str) -> io::Result<PathBuf> {
        let path = self.root.join(marker_relative_path(stage));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{}\n", chrono::Local::now().to_rfc3339()))?;
        Ok(path)
    }

    /// Remove every completion marker (used by `--reset-state`).
    pub fn clear_markers(&self) -> io::Result<()> {
        let dir = self.root.join(STATE_DIR).join(MARKER_DIR);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
