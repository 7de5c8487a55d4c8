//! Preparation: NDK, source checkouts and the standalone cross toolchain.
//!
//! All of these stages are plain downloads or checkouts on the host except
//! `standalone-toolchain`, which runs the NDK generator inside the dockcross
//! image so it sees the same filesystem layout as the NumPy build later on.

use crate::models::{Artifact, ExecutionEnvironment};
use crate::orchestrator::stages::Stage;
use crate::toolchain::Layout;

use super::{CLONE_NUMPY, CLONE_OPENCV, DOWNLOAD_NDK, EXTRACT_NDK, PULL_IMAGE, STANDALONE_TOOLCHAIN};

pub fn download_ndk(layout: &Layout) -> Stage {
    Stage::commands(
        DOWNLOAD_NDK,
        ExecutionEnvironment::Local,
        &[
            &["curl", "-fL", "-o", "{NDK_ARCHIVE}.part", "{NDK_URL}"],
            &["mv", "{NDK_ARCHIVE}.part", "{NDK_ARCHIVE}"],
        ],
        Artifact::file("ndk archive", &layout.ndk_archive),
    )
}

pub fn extract_ndk(layout: &Layout) -> Stage {
    Stage::commands(
        EXTRACT_NDK,
        ExecutionEnvironment::Local,
        &[&["unzip", "-q", "-o", "{NDK_ARCHIVE}", "-d", "{NDK_DIR}"]],
        Artifact::directory("ndk", &layout.ndk_dir),
    )
    .requires(Artifact::file("ndk archive", &layout.ndk_archive))
}

pub fn clone_numpy(layout: &Layout) -> Stage {
    Stage::commands(
        CLONE_NUMPY,
        ExecutionEnvironment::Local,
        &[
            &["git", "clone", "{NUMPY_REPO}", "{NUMPY_SRC}"],
            &["git", "-C", "{NUMPY_SRC}", "checkout", "{NUMPY_REF}"],
        ],
        Artifact::directory("numpy source", &layout.numpy_src),
    )
}

pub fn clone_opencv(layout: &Layout) -> Stage {
    Stage::commands(
        CLONE_OPENCV,
        ExecutionEnvironment::Local,
        &[
            &["git", "clone", "{OPENCV_REPO}", "{OPENCV_SRC}"],
            &["git", "-C", "{OPENCV_SRC}", "checkout", "{OPENCV_REF}"],
        ],
        Artifact::directory("opencv source", &layout.opencv_src),
    )
}

/// Fetch the cross-toolchain image up front so a registry failure shows up
/// here rather than halfway into the first container stage.
pub fn pull_image() -> Stage {
    Stage::commands(
        PULL_IMAGE,
        ExecutionEnvironment::Local,
        &[&["{CONTAINER_RUNTIME}", "pull", "{DOCKCROSS_IMAGE}"]],
        Artifact::marker(PULL_IMAGE),
    )
}

pub fn standalone_toolchain(layout: &Layout) -> Stage {
    Stage::commands(
        STANDALONE_TOOLCHAIN,
        ExecutionEnvironment::Container,
        &[
            &["chmod", "755", "{MAKE_STANDALONE_TOOLCHAIN}"],
            &[
                "{MAKE_STANDALONE_TOOLCHAIN}",
                "--platform=android-{API_LEVEL}",
                "--arch={ARCH}",
                "--install-dir={TOOLCHAIN_DIR}",
                "--verbose",
            ],
        ],
        Artifact::directory("standalone toolchain", &layout.toolchain_dir),
    )
    .requires(Artifact::directory("ndk", &layout.ndk_dir))
    .requires(Artifact::marker(PULL_IMAGE))
}
