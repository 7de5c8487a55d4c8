//! Pipeline state and the persisted run manifest.
//!
//! **Architecture**:
//! - `StageStatus`: per-stage status within one run
//! - `PipelineState`: target, stage list and statuses, last completed index
//! - Saved to `.cvforge/state.json` after every stage
//!
//! The manifest is informational. Artifact existence stays the idempotency
//! signal; the manifest only pins the target a working directory belongs to
//! and lets `cvforge status` show where the last run stopped.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::models::BuildTarget;
use crate::orchestrator::checkpoint::STATE_DIR;

pub const MANIFEST_FILE: &str = "state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Skipped,
    Succeeded,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Skipped => "skipped",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
        }
    }

    /// Skipped and Succeeded both mean the stage's artifact is in place.
    pub fn is_complete(&self) -> bool {
        matches!(self, StageStatus::Skipped | StageStatus::Succeeded)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    /// Failure reason, if the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Local>>,
}

/// Explicit state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub target: BuildTarget,
    pub stages: Vec<StageRecord>,
    /// Index of the last stage that reached Skipped or Succeeded.
    pub last_completed: Option<usize>,
    pub started_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

impl PipelineState {
    pub fn new<S: AsRef<str>>(target: BuildTarget, stage_names: &[S]) -> Self {
        let now = Local::now();
        PipelineState {
            target,
            stages: stage_names
                .iter()
                .map(|name| StageRecord {
                    name: name.as_ref().to_string(),
                    status: StageStatus::Pending,
                    detail: None,
                    finished_at: None,
                })
                .collect(),
            last_completed: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn manifest_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(MANIFEST_FILE)
    }

    /// Read the manifest under `root`, if any.
    pub fn load(root: &Path) -> Result<Option<Self>, PipelineError> {
        let path = Self::manifest_path(root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, root: &Path) -> Result<(), PipelineError> {
        let path = Self::manifest_path(root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Reject running a different target in a working directory.
    pub fn ensure_target(&self, requested: &BuildTarget) -> Result<(), PipelineError> {
        if self.target != *requested {
            return Err(PipelineError::TargetMismatch {
                recorded: self.target.to_string(),
                requested: requested.to_string(),
            });
        }
        Ok(())
    }

    pub fn record(&mut self, index: usize, status: StageStatus, detail: Option<String>) {
        let now = Local::now();
        if let Some(stage) = self.stages.get_mut(index) {
            stage.status = status;
            stage.detail = detail;
            stage.finished_at = Some(now);
            if status.is_complete() {
                self.last_completed = Some(index);
            }
        }
        self.updated_at = now;
    }

    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|stage| stage.name == name)
            .map(|stage| stage.status)
    }

    pub fn first_failure(&self) -> Option<&StageRecord> {
        self.stages
            .iter()
            .find(|stage| stage.status == StageStatus::Failed)
    }
}
