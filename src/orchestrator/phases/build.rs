//! Build stages: unpack the Termux tree, cross-build NumPy, build OpenCV.

use crate::models::{Artifact, ExecutionEnvironment, RuntimeEnvironment};
use crate::orchestrator::stages::Stage;
use crate::toolchain::Layout;

use super::{BUILD_NUMPY, BUILD_OPENCV, EDIT_OPENCV_TOOLCHAIN, EXTRACT_TERMUX};

fn termux_tree(layout: &Layout) -> Artifact {
    Artifact::non_empty_directory("termux tree", &layout.termux_dir)
}

pub fn extract_termux(layout: &Layout) -> Stage {
    Stage::commands(
        EXTRACT_TERMUX,
        ExecutionEnvironment::Local,
        &[&["unzip", "-q", "-o", "{TERMUX_ARCHIVE}", "-d", "{TERMUX_DIR}"]],
        termux_tree(layout),
    )
    .requires(Artifact::file("termux archive", &layout.termux_archive))
}

/// Runs inside the container: CC/LDSHARED point at the standalone toolchain
/// and link against the device's libpython. The shared checkout keeps object
/// files from the previous target, hence the clean.
pub fn build_numpy(layout: &Layout) -> Stage {
    Stage::commands(
        BUILD_NUMPY,
        ExecutionEnvironment::Container,
        &[
            &["python", "setup.py", "clean", "--all"],
            &["python", "setup.py", "bdist_egg", "--dist-dir", "{NUMPY_DIST}"],
        ],
        Artifact::non_empty_directory("numpy egg", &layout.numpy_dist),
    )
    .in_dir(&layout.numpy_src)
    .requires(Artifact::directory("standalone toolchain", &layout.toolchain_dir))
    .requires(Artifact::directory("numpy source", &layout.numpy_src))
    .requires(termux_tree(layout))
}

/// OpenCV's android toolchain file hardcodes the python library location.
pub fn edit_opencv_toolchain(layout: &Layout) -> Stage {
    let prompt = format!(
        "Edit {} so it links against {}, then press Enter to build OpenCV",
        layout
            .opencv_android_platform
            .join("android.toolchain.cmake")
            .display(),
        layout.termux_prefix.join("lib/libpython2.7.so").display()
    );
    Stage::manual(EDIT_OPENCV_TOOLCHAIN, &prompt)
        .requires(Artifact::directory("opencv source", &layout.opencv_src))
        .requires(termux_tree(layout))
}

pub fn build_opencv(layout: &Layout, runtime: RuntimeEnvironment) -> Stage {
    let stage = Stage::commands(
        BUILD_OPENCV,
        ExecutionEnvironment::Local,
        &[
            &["mkdir", "-p", "{OPENCV_BUILD_DIR}"],
            &[
                "python",
                "build_sdk.py",
                "{OPENCV_BUILD_DIR}",
                "{OPENCV_SRC}",
                "--abi={ABI}",
            ],
        ],
        Artifact::file("cv2 module", &layout.cv2_module),
    )
    .in_dir(&layout.opencv_android_platform)
    .requires(Artifact::directory("ndk", &layout.ndk_dir))
    .requires(Artifact::marker(EDIT_OPENCV_TOOLCHAIN));

    match runtime {
        RuntimeEnvironment::HostAndroidBuild => {
            stage.requires(Artifact::non_empty_directory("numpy egg", &layout.numpy_dist))
        }
        RuntimeEnvironment::DeviceTermuxBuild => stage,
    }
}
