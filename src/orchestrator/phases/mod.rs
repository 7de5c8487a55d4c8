//! Stage catalogue: the fixed pipeline for each runtime environment.
//!
//! - **prep**: NDK download and extraction, source checkouts, cross toolchain
//! - **device**: Termux bootstrap, pulling its output, the on-device smoke test
//! - **build**: Termux extraction, NumPy and OpenCV builds, the manual edit
//!
//! Every path here comes from [`Layout`] or a `{VAR}` placeholder resolved by
//! the toolchain resolver; nothing is hardcoded.

pub mod build;
pub mod device;
pub mod prep;

use crate::config::ForgeSettings;
use crate::models::{BuildTarget, RuntimeEnvironment};
use crate::orchestrator::stages::Stage;
use crate::toolchain::{Layout, VarGroup};

pub const DOWNLOAD_NDK: &str = "download-ndk";
pub const EXTRACT_NDK: &str = "extract-ndk";
pub const CLONE_NUMPY: &str = "clone-numpy";
pub const CLONE_OPENCV: &str = "clone-opencv";
pub const PULL_IMAGE: &str = "pull-image";
pub const STANDALONE_TOOLCHAIN: &str = "standalone-toolchain";
pub const TERMUX_BOOTSTRAP: &str = "termux-bootstrap";
pub const PULL_TERMUX: &str = "pull-termux";
pub const EXTRACT_TERMUX: &str = "extract-termux";
pub const BUILD_NUMPY: &str = "build-numpy";
pub const EDIT_OPENCV_TOOLCHAIN: &str = "edit-opencv-toolchain";
pub const BUILD_OPENCV: &str = "build-opencv";
pub const DEVICE_SMOKE_TEST: &str = "device-smoke-test";

const STAGE_VAR_GROUPS: &[(&str, &[VarGroup])] = &[
    (DOWNLOAD_NDK, &[]),
    (EXTRACT_NDK, &[]),
    (CLONE_NUMPY, &[]),
    (CLONE_OPENCV, &[]),
    (PULL_IMAGE, &[]),
    (STANDALONE_TOOLCHAIN, &[VarGroup::StandaloneToolchain]),
    (TERMUX_BOOTSTRAP, &[VarGroup::Device]),
    (PULL_TERMUX, &[VarGroup::Device]),
    (EXTRACT_TERMUX, &[]),
    (BUILD_NUMPY, &[VarGroup::NumpyCross]),
    (EDIT_OPENCV_TOOLCHAIN, &[]),
    (BUILD_OPENCV, &[VarGroup::OpencvPython]),
    (DEVICE_SMOKE_TEST, &[VarGroup::Device]),
];

/// Variable groups each built-in stage resolves, in catalogue order.
pub fn stage_var_groups() -> &'static [(&'static str, &'static [VarGroup])] {
    STAGE_VAR_GROUPS
}

/// The ordered stage list for `target`.
pub fn catalogue(target: &BuildTarget, settings: &ForgeSettings) -> Vec<Stage> {
    let layout = Layout::new(target, settings);
    match target.runtime {
        RuntimeEnvironment::HostAndroidBuild => vec![
            prep::download_ndk(&layout),
            prep::extract_ndk(&layout),
            prep::clone_numpy(&layout),
            prep::clone_opencv(&layout),
            prep::pull_image(),
            prep::standalone_toolchain(&layout),
            device::termux_bootstrap(),
            device::pull_termux(&layout),
            build::extract_termux(&layout),
            build::build_numpy(&layout),
            build::edit_opencv_toolchain(&layout),
            build::build_opencv(&layout, target.runtime),
            device::smoke_test(&layout),
        ],
        // NumPy comes prebuilt from Termux, so no container stages
        RuntimeEnvironment::DeviceTermuxBuild => vec![
            prep::download_ndk(&layout),
            prep::extract_ndk(&layout),
            prep::clone_opencv(&layout),
            device::termux_bootstrap(),
            device::pull_termux(&layout),
            build::extract_termux(&layout),
            build::edit_opencv_toolchain(&layout),
            build::build_opencv(&layout, target.runtime),
            device::smoke_test(&layout),
        ],
    }
}
