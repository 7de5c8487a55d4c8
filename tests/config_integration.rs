//! Settings files flowing into stage environments and the catalogue.

use cvforge::config::{load_settings, resolve_settings, save_settings, ForgeSettings};
use cvforge::models::{Architecture, BuildTarget, RuntimeEnvironment};
use cvforge::orchestrator::phases;
use cvforge::orchestrator::{DeviceStep, Pipeline, StageAction};
use cvforge::toolchain::ToolchainResolver;
use tempfile::TempDir;

fn termux_target() -> BuildTarget {
    BuildTarget::new(Architecture::Arm64, 24, RuntimeEnvironment::DeviceTermuxBuild).unwrap()
}

#[test]
fn test_toml_round_trip_reaches_stage_environment() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("cvforge.toml");
    let settings = ForgeSettings {
        device_download_dir: "/storage/emulated/0/Download/".to_string(),
        termux_package: "com.termux.nightly".to_string(),
        ndk_version: "r16b".to_string(),
        ..ForgeSettings::default()
    };
    save_settings(&settings, &path).unwrap();

    let loaded = resolve_settings(Some(&path)).unwrap();
    assert_eq!(loaded, settings);

    let resolver = ToolchainResolver::new("/ws", loaded);
    let env = resolver
        .resolve(&termux_target(), phases::DEVICE_SMOKE_TEST)
        .unwrap();
    assert_eq!(env.get("TERMUX_PACKAGE"), Some("com.termux.nightly"));
    assert_eq!(
        env.get("DEVICE_CV2_MODULE"),
        Some("/storage/emulated/0/Download/cv2.so")
    );
    assert!(env.get("NDK_URL").unwrap().ends_with("android-ndk-r16b-linux-x86_64.zip"));
}

#[test]
fn test_device_steps_use_configured_package() {
    let settings = ForgeSettings {
        termux_package: "com.termux.nightly".to_string(),
        ..ForgeSettings::default()
    };
    let target = termux_target();
    let resolver = ToolchainResolver::new("/ws", settings.clone());
    let pipeline = Pipeline::for_target(&target, &settings).unwrap();
    let bootstrap = pipeline
        .stages()
        .iter()
        .find(|stage| stage.name == phases::TERMUX_BOOTSTRAP)
        .unwrap();
    let env = resolver.resolve(&target, &bootstrap.name).unwrap();

    let StageAction::Device(steps) = &bootstrap.action else {
        panic!("bootstrap must be a device stage");
    };
    let expanded: Vec<DeviceStep> = steps.iter().map(|s| s.expand(&env).unwrap()).collect();
    assert!(expanded.contains(&DeviceStep::Launch {
        package: "com.termux.nightly".to_string()
    }));
}

#[test]
fn test_invalid_settings_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("cvforge.json");
    std::fs::write(&path, r#"{ "container_mount": "relative" }"#).unwrap();
    assert!(load_settings(&path).is_err());
}
