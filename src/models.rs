//! Core data types for cvforge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::TargetError;

/// Lowest Android API level the standalone toolchains are generated for.
pub const MIN_API_LEVEL: u32 = 16;

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    Arm,
    Arm64,
}

impl Architecture {
    pub const ALL: [Architecture; 3] = [Architecture::X86, Architecture::Arm, Architecture::Arm64];

    /// NDK architecture name (`--arch` of make-standalone-toolchain).
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = TargetError;

    /// Accepts both NDK names and Android ABI names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x86" => Ok(Architecture::X86),
            "arm" | "armeabi-v7a" => Ok(Architecture::Arm),
            "arm64" | "arm64-v8a" | "aarch64" => Ok(Architecture::Arm64),
            _ => Err(TargetError::UnknownArchitecture(s.to_string())),
        }
    }
}

/// Where the Python runtime and NumPy for the target come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuntimeEnvironment {
    /// NumPy is cross-built on the host inside the dockcross container.
    HostAndroidBuild,
    /// NumPy is built on the device by Termux and pulled back.
    DeviceTermuxBuild,
}

impl RuntimeEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeEnvironment::HostAndroidBuild => "host",
            RuntimeEnvironment::DeviceTermuxBuild => "termux",
        }
    }
}

impl fmt::Display for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeEnvironment {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" | "android" | "hostandroidbuild" => Ok(RuntimeEnvironment::HostAndroidBuild),
            "termux" | "device" | "devicetermuxbuild" => Ok(RuntimeEnvironment::DeviceTermuxBuild),
            _ => Err(TargetError::UnknownRuntime(s.to_string())),
        }
    }
}

/// The single target a pipeline run is built for.
///
/// Selected once at pipeline start and threaded through every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
    pub architecture: Architecture,
    pub api_level: u32,
    pub runtime: RuntimeEnvironment,
}

impl BuildTarget {
    pub fn new(
        architecture: Architecture,
        api_level: u32,
        runtime: RuntimeEnvironment,
    ) -> Result<Self, TargetError> {
        if api_level < MIN_API_LEVEL {
            return Err(TargetError::ApiLevelTooLow(api_level, MIN_API_LEVEL));
        }
        Ok(BuildTarget {
            architecture,
            api_level,
            runtime,
        })
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/api-{}/{}",
            self.architecture, self.api_level, self.runtime
        )
    }
}

/// Execution environment a stage's commands are dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionEnvironment {
    /// Direct process spawn on the host.
    Local,
    /// Process spawn inside the cross-toolchain image with the working directory mounted.
    Container,
    /// Keystrokes and file transfer through the debug bridge; no return code.
    Device,
}

impl fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionEnvironment::Local => write!(f, "local"),
            ExecutionEnvironment::Container => write!(f, "container"),
            ExecutionEnvironment::Device => write!(f, "device"),
        }
    }
}

/// Existence predicate of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    File,
    Directory,
    NonEmptyDirectory,
    /// The producing stage's own completion marker; written by the runner.
    Marker,
}

/// A named file-system object whose existence signals a stage's completion.
///
/// Paths are relative to the pipeline working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn file(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Artifact::new(name, path, ArtifactKind::File)
    }

    pub fn directory(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Artifact::new(name, path, ArtifactKind::Directory)
    }

    pub fn non_empty_directory(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Artifact::new(name, path, ArtifactKind::NonEmptyDirectory)
    }

    /// Marker artifact for `stage`, stored with the other completion markers.
    pub fn marker(stage: &str) -> Self {
        Artifact::new(
            format!("{}-done", stage),
            crate::orchestrator::checkpoint::marker_relative_path(stage),
            ArtifactKind::Marker,
        )
    }

    fn new(name: impl Into<String>, path: impl AsRef<Path>, kind: ArtifactKind) -> Self {
        Artifact {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            kind,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_accepts_abi_names() {
        assert_eq!("armeabi-v7a".parse::<Architecture>().unwrap(), Architecture::Arm);
        assert_eq!("arm64-v8a".parse::<Architecture>().unwrap(), Architecture::Arm64);
        assert_eq!("X86".parse::<Architecture>().unwrap(), Architecture::X86);
        assert!("mips".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_runtime_parse() {
        assert_eq!(
            "host".parse::<RuntimeEnvironment>().unwrap(),
            RuntimeEnvironment::HostAndroidBuild
        );
        assert_eq!(
            "termux".parse::<RuntimeEnvironment>().unwrap(),
            RuntimeEnvironment::DeviceTermuxBuild
        );
        assert!("cloud".parse::<RuntimeEnvironment>().is_err());
    }

    #[test]
    fn test_build_target_rejects_low_api() {
        let err = BuildTarget::new(Architecture::Arm, 9, RuntimeEnvironment::HostAndroidBuild)
            .unwrap_err();
        assert_eq!(err, TargetError::ApiLevelTooLow(9, MIN_API_LEVEL));
    }

    #[test]
    fn test_build_target_display() {
        let target =
            BuildTarget::new(Architecture::Arm64, 26, RuntimeEnvironment::DeviceTermuxBuild)
                .unwrap();
        assert_eq!(target.to_string(), "arm64/api-26/termux");
    }

    #[test]
    fn test_marker_artifact_lives_under_state_dir() {
        let marker = Artifact::marker("pull-termux");
        assert_eq!(marker.kind, ArtifactKind::Marker);
        assert!(marker.path.starts_with(".cvforge"));
    }
}
