//! Settings file loader and serialization.

use crate::config::ForgeSettings;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings file format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsFormat {
    Json,
    Toml,
}

/// Get the global settings path: ~/.config/cvforge/settings.json
pub fn get_global_settings_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        ConfigError::ValidationFailed("Cannot determine config directory".to_string())
    })?;

    Ok(config_dir.join("cvforge").join("settings.json"))
}

/// Load settings from a JSON or TOML file and validate them.
pub fn load_settings(path: &Path) -> Result<ForgeSettings, ConfigError> {
    let format = validate_settings_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let settings: ForgeSettings = match format {
        SettingsFormat::Json => serde_json::from_str(&content)?,
        SettingsFormat::Toml => {
            toml::from_str(&content).map_err(|e| ConfigError::InvalidToml(e.to_string()))?
        }
    };

    settings.validate()?;
    Ok(settings)
}

/// Save settings to a JSON or TOML file, creating parent directories.
pub fn save_settings(settings: &ForgeSettings, path: &Path) -> Result<(), ConfigError> {
    let format = validate_settings_path(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = match format {
        SettingsFormat::Json => serde_json::to_string_pretty(settings)?,
        SettingsFormat::Toml => toml::to_string_pretty(settings)
            .map_err(|e| ConfigError::InvalidToml(e.to_string()))?,
    };

    fs::write(path, content)?;
    Ok(())
}

/// Pick the settings for this invocation.
///
/// An explicit path must exist. Without one, the global settings file is used
/// when present, otherwise defaults.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<ForgeSettings, ConfigError> {
    if let Some(path) = explicit {
        log::info!("[Config] Loading settings from {}", path.display());
        return load_settings(path);
    }

    let global = get_global_settings_path()?;
    if global.is_file() {
        log::info!("[Config] Loading global settings from {}", global.display());
        load_settings(&global)
    } else {
        log::debug!(
            "[Config] No settings at {}, using defaults",
            global.display()
        );
        Ok(ForgeSettings::default())
    }
}

/// Validate settings path (.json or .toml extension required).
fn validate_settings_path(path: &Path) -> Result<SettingsFormat, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(SettingsFormat::Json),
        Some("toml") => Ok(SettingsFormat::Toml),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Configuration file must have .json or .toml extension, got .{}",
            ext
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Configuration file must have .json or .toml extension".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/settings.json");

        let original = ForgeSettings {
            opencv_ref: "4.x".to_string(),
            keystroke_settle_ms: 1500,
            strict_markers: true,
            ..ForgeSettings::default()
        };
        save_settings(&original, &path).expect("Failed to save settings");

        let loaded = load_settings(&path).expect("Failed to load settings");
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        fs::write(
            &path,
            "ndk_host = \"darwin\"\ndockcross_image = \"android-arm\"\n",
        )
        .unwrap();

        let loaded = load_settings(&path).expect("Failed to load TOML settings");
        assert_eq!(loaded.ndk_host, "darwin");
        assert_eq!(loaded.dockcross_image, "android-arm");
        assert_eq!(loaded.adb_binary, "adb");
    }

    #[test]
    fn test_invalid_extension() {
        assert!(validate_settings_path(Path::new("settings.yaml")).is_err());
        assert!(validate_settings_path(Path::new("settings")).is_err());
        assert!(validate_settings_path(Path::new("")).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_settings(Path::new("/nonexistent/path/settings.json"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "{ invalid json }").unwrap();

        assert!(matches!(
            load_settings(&path),
            Err(ConfigError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_loaded_settings_are_validated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{ "launch_settle_ms": 0 }"#).unwrap();

        assert!(matches!(
            load_settings(&path),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let result = resolve_settings(Some(Path::new("/nonexistent/cvforge.json")));
        assert!(result.is_err());
    }
}
