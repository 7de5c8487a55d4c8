//! Configuration module for cvforge pipelines.
//!
//! `ForgeSettings` holds every knob that is not part of the `BuildTarget`:
//! where sources come from, which container image and bridge binary to drive,
//! on-device locations and the settle delays used for blind keystroke
//! injection.
//!
//! # Module Structure
//!
//! - `loader`: loading/saving settings files (JSON or TOML) and path helpers

pub mod loader;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::{load_settings, resolve_settings, save_settings};

/// Pipeline-wide settings, serialised as `settings.json` (or TOML).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeSettings {
    // Android NDK
    pub ndk_version: String,
    /// NDK host flavour used in archive names (`linux` or `darwin`).
    pub ndk_host: String,
    pub ndk_base_url: String,

    // Sources
    pub numpy_repo: String,
    pub numpy_ref: String,
    pub opencv_repo: String,
    pub opencv_ref: String,

    // Container
    /// dockcross image used for container stages (without the `dockcross/` prefix).
    pub dockcross_image: String,
    pub container_runtime: String,
    /// Fixed in-container path the working directory is mounted at.
    pub container_mount: String,

    // Device
    pub adb_binary: String,
    pub termux_package: String,
    pub device_download_dir: String,
    pub termux_setup_script: String,
    pub termux_archive: String,
    pub smoke_test_image: String,

    // Settle delays (ms) after blind device actions
    pub launch_settle_ms: u64,
    pub keystroke_settle_ms: u64,

    // Checkpointing
    /// Require completion markers next to artifacts before skipping a stage.
    pub strict_markers: bool,
    /// Poll interval (ms) for the signal-file confirmation gate.
    pub signal_poll_ms: u64,
}

impl Default for ForgeSettings {
    fn default() -> Self {
        ForgeSettings {
            ndk_version: "r15c".to_string(),
            ndk_host: "linux".to_string(),
            ndk_base_url: "https://dl.google.com/android/repository".to_string(),
            numpy_repo: "https://github.com/numpy/numpy.git".to_string(),
            numpy_ref: "tags/v1.12.0".to_string(),
            opencv_repo: "https://github.com/mwgray/opencv.git".to_string(),
            opencv_ref: "python".to_string(),
            dockcross_image: "linux-x86".to_string(),
            container_runtime: "docker".to_string(),
            container_mount: "/work".to_string(),
            adb_binary: "adb".to_string(),
            termux_package: "com.termux".to_string(),
            device_download_dir: "/sdcard/Download".to_string(),
            termux_setup_script: "setup-termux.sh".to_string(),
            termux_archive: "termux.zip".to_string(),
            smoke_test_image: "ss.png".to_string(),
            launch_settle_ms: 3000,
            keystroke_settle_ms: 1000,
            strict_markers: false,
            signal_poll_ms: 2000,
        }
    }
}

impl ForgeSettings {
    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }

    pub fn keystroke_settle(&self) -> Duration {
        Duration::from_millis(self.keystroke_settle_ms)
    }

    pub fn signal_poll(&self) -> Duration {
        Duration::from_millis(self.signal_poll_ms)
    }

    /// Reject settings that would produce broken commands.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("ndk_version", &self.ndk_version),
            ("ndk_host", &self.ndk_host),
            ("numpy_repo", &self.numpy_repo),
            ("opencv_repo", &self.opencv_repo),
            ("dockcross_image", &self.dockcross_image),
            ("container_runtime", &self.container_runtime),
            ("adb_binary", &self.adb_binary),
            ("termux_package", &self.termux_package),
            ("device_download_dir", &self.device_download_dir),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "'{}' must not be empty",
                    field
                )));
            }
        }

        if !self.container_mount.starts_with('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "container_mount must be an absolute path, got '{}'",
                self.container_mount
            )));
        }

        if self.ndk_host != "linux" && self.ndk_host != "darwin" {
            return Err(ConfigError::ValidationFailed(format!(
                "ndk_host must be 'linux' or 'darwin', got '{}'",
                self.ndk_host
            )));
        }

        // A zero delay would fire keystrokes faster than the remote shell reads them
        if self.launch_settle_ms == 0 || self.keystroke_settle_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "settle delays must be greater than zero".to_string(),
            ));
        }

        if self.signal_poll_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "signal_poll_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ForgeSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.ndk_version, "r15c");
        assert_eq!(settings.keystroke_settle(), Duration::from_secs(1));
        assert_eq!(settings.launch_settle(), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_settle_rejected() {
        let settings = ForgeSettings {
            keystroke_settle_ms: 0,
            ..ForgeSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_relative_mount_rejected() {
        let settings = ForgeSettings {
            container_mount: "work".to_string(),
            ..ForgeSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_ndk_host_rejected() {
        let settings = ForgeSettings {
            ndk_host: "windows".to_string(),
            ..ForgeSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: ForgeSettings =
            serde_json::from_str(r#"{ "opencv_ref": "4.x", "strict_markers": true }"#).unwrap();
        assert_eq!(settings.opencv_ref, "4.x");
        assert!(settings.strict_markers);
        assert_eq!(settings.numpy_ref, "tags/v1.12.0");
    }
}
