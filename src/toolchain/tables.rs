//! Lookup tables behind the toolchain resolver.
//!
//! Retargeting the pipeline means editing these tables; nothing here computes
//! paths beyond substituting the target's names into fixed templates.

use std::path::{Path, PathBuf};

use crate::config::ForgeSettings;
use crate::models::{Architecture, BuildTarget, RuntimeEnvironment};

/// Per-architecture names used by the NDK, the toolchain and Android.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchTable {
    /// GNU triple used as the compiler prefix inside a standalone toolchain.
    pub triple: &'static str,
    /// Android ABI directory name.
    pub abi: &'static str,
    /// `--arch` value for make-standalone-toolchain.sh.
    pub ndk_arch: &'static str,
}

pub fn arch_table(arch: Architecture) -> ArchTable {
    match arch {
        Architecture::X86 => ArchTable {
            triple: "i686-linux-android",
            abi: "x86",
            ndk_arch: "x86",
        },
        Architecture::Arm => ArchTable {
            triple: "arm-linux-androideabi",
            abi: "armeabi-v7a",
            ndk_arch: "arm",
        },
        Architecture::Arm64 => ArchTable {
            triple: "aarch64-linux-android",
            abi: "arm64-v8a",
            ndk_arch: "arm64",
        },
    }
}

/// Per-runtime path templates that differ between host and Termux builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RuntimeTable {
    opencv_build_dir: &'static str,
    /// NumPy headers OpenCV compiles its python bindings against.
    numpy_include: &'static str,
}

fn runtime_table(runtime: RuntimeEnvironment) -> RuntimeTable {
    match runtime {
        RuntimeEnvironment::HostAndroidBuild => RuntimeTable {
            opencv_build_dir: "opencv-android-build/android-{api}",
            numpy_include: "numpy/numpy/core/include",
        },
        RuntimeEnvironment::DeviceTermuxBuild => RuntimeTable {
            opencv_build_dir: "opencv-android-build-termux/android-{api}",
            numpy_include: "termux/{abi}/site-packages/numpy/core/include",
        },
    }
}

/// Artifact and input locations relative to the working directory.
///
/// Anything built for or pulled from one target carries the ABI or API level
/// in its path, so a reset run for another target never finds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub ndk_archive: PathBuf,
    pub ndk_dir: PathBuf,
    pub ndk_root: PathBuf,
    pub toolchain_dir: PathBuf,
    pub numpy_src: PathBuf,
    pub numpy_dist: PathBuf,
    pub numpy_include: PathBuf,
    pub opencv_src: PathBuf,
    pub opencv_android_platform: PathBuf,
    pub opencv_build_dir: PathBuf,
    pub cv2_module: PathBuf,
    pub termux_archive: PathBuf,
    pub termux_dir: PathBuf,
    pub termux_prefix: PathBuf,
    pub android_sdk: PathBuf,
    pub setup_script: PathBuf,
    pub test_image: PathBuf,
}

impl Layout {
    pub fn new(target: &BuildTarget, settings: &ForgeSettings) -> Self {
        let arch = arch_table(target.architecture);
        let runtime = runtime_table(target.runtime);
        let fill = |template: &str| {
            template
                .replace("{api}", &target.api_level.to_string())
                .replace("{arch}", arch.ndk_arch)
                .replace("{abi}", arch.abi)
                .replace("{ndk}", &settings.ndk_version)
                .replace("{host}", &settings.ndk_host)
        };

        let ndk_dir = PathBuf::from(fill("android-ndk-{ndk}-{host}"));
        let opencv_build_dir = PathBuf::from(fill(runtime.opencv_build_dir));
        let termux_dir = PathBuf::from(fill("termux/{abi}"));

        Layout {
            ndk_archive: PathBuf::from(fill("android-ndk-{ndk}-{host}.zip")),
            ndk_root: ndk_dir.join(fill("android-ndk-{ndk}")),
            ndk_dir,
            toolchain_dir: PathBuf::from(fill("toolchain-{api}-{arch}")),
            numpy_src: PathBuf::from("numpy"),
            numpy_dist: PathBuf::from(fill("numpy-dist/android-{api}-{abi}")),
            numpy_include: PathBuf::from(fill(runtime.numpy_include)),
            opencv_src: PathBuf::from("opencv"),
            opencv_android_platform: PathBuf::from("opencv/platforms/android"),
            cv2_module: opencv_build_dir
                .join("o4a/lib")
                .join(arch.abi)
                .join("cv2.so"),
            opencv_build_dir,
            termux_archive: keyed_file_name(&settings.termux_archive, arch.abi),
            termux_prefix: termux_dir.join("files/usr"),
            termux_dir,
            android_sdk: PathBuf::from("android-sdk"),
            setup_script: PathBuf::from(&settings.termux_setup_script),
            test_image: PathBuf::from(&settings.smoke_test_image),
        }
    }
}

/// `termux.zip` keyed by `armeabi-v7a` becomes `termux-armeabi-v7a.zip`.
fn keyed_file_name(name: &str, key: &str) -> PathBuf {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, key, ext.to_string_lossy()),
        None => format!("{}-{}", stem, key),
    };
    path.with_file_name(file)
}

/// Remote archive name of the NDK release for the configured host flavour.
pub fn ndk_download_name(settings: &ForgeSettings) -> String {
    format!(
        "android-ndk-{}-{}-x86_64.zip",
        settings.ndk_version, settings.ndk_host
    )
}
