//! Device-side stages. Their effects are only observable on the device, so
//! most of them produce a completion marker rather than a host artifact.

use crate::models::Artifact;
use crate::orchestrator::stages::{DeviceStep, Stage};
use crate::toolchain::Layout;

use super::{DEVICE_SMOKE_TEST, PULL_TERMUX, TERMUX_BOOTSTRAP};

const STORAGE_PERMISSIONS: [&str; 2] = [
    "android.permission.WRITE_EXTERNAL_STORAGE",
    "android.permission.READ_EXTERNAL_STORAGE",
];

/// Push the setup script and start it inside Termux. The script builds
/// python2 and NumPy on the device and leaves an archive in the download dir.
pub fn termux_bootstrap() -> Stage {
    let mut steps = vec![DeviceStep::push("{SETUP_SCRIPT}", "{DEVICE_DIR}")];
    for permission in STORAGE_PERMISSIONS {
        steps.push(DeviceStep::grant("{TERMUX_PACKAGE}", permission));
    }
    steps.extend([
        DeviceStep::launch("{TERMUX_PACKAGE}"),
        DeviceStep::keys("cp {DEVICE_SETUP_SCRIPT} ."),
        DeviceStep::keys("chmod 755 {SETUP_SCRIPT_NAME}"),
        DeviceStep::keys("./{SETUP_SCRIPT_NAME}"),
    ]);

    Stage::device(TERMUX_BOOTSTRAP, steps)
        .confirm_before(
            "Attach an Android device with Termux installed, then press Enter to bootstrap it",
        )
        .confirm_after(
            "Termux is now building python and NumPy on the device. Press Enter once it has finished",
        )
}

pub fn pull_termux(layout: &Layout) -> Stage {
    Stage::device(
        PULL_TERMUX,
        vec![DeviceStep::pull("{DEVICE_TERMUX_ARCHIVE}", "{TERMUX_ARCHIVE}")],
    )
    .requires(Artifact::marker(TERMUX_BOOTSTRAP))
    .produces(Artifact::file("termux archive", &layout.termux_archive))
}

/// Import the fresh module in Termux' python2 and read the test image.
pub fn smoke_test(layout: &Layout) -> Stage {
    let steps = vec![
        DeviceStep::push("{CV2_MODULE}", "{DEVICE_DIR}"),
        DeviceStep::push("{TEST_IMAGE}", "{DEVICE_DIR}"),
        DeviceStep::launch("{TERMUX_PACKAGE}"),
        DeviceStep::keys("cp {DEVICE_CV2_MODULE} ."),
        DeviceStep::keys("python2"),
        DeviceStep::keys("import cv2"),
        DeviceStep::keys("print(cv2.imread('{DEVICE_TEST_IMAGE}').size)"),
        DeviceStep::keys("quit()"),
    ];

    Stage::device(DEVICE_SMOKE_TEST, steps)
        .requires(Artifact::file("cv2 module", &layout.cv2_module))
        .confirm_before("OpenCV is built. Press Enter to test it on the device")
        .confirm_after(
            "Check that Termux printed the image size without errors, then press Enter",
        )
}
