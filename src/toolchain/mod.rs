//! Toolchain resolution: the environment every stage command runs under.
//!
//! `ToolchainResolver::resolve` is a pure function of `(BuildTarget, stage)`.
//! Every path a stage touches is produced here from the tables in
//! [`tables`], so stages never hardcode locations and retargeting the
//! pipeline means editing one table.

pub mod tables;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ForgeSettings;
use crate::error::ResolveError;
use crate::models::BuildTarget;
use crate::orchestrator::phases;

pub use tables::{arch_table, ArchTable, Layout};

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Z][A-Z0-9_]*)\}").expect("Invalid placeholder regex"));

/// Groups of variables a stage can ask for, on top of the layout variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarGroup {
    /// NDK standalone toolchain generator.
    StandaloneToolchain,
    /// CC/CXX/LDSHARED/CFLAGS/LDFLAGS for cross-building NumPy.
    NumpyCross,
    /// PYTHON2_* and ANDROID_* variables for OpenCV's build_sdk.py.
    OpencvPython,
    /// On-device locations and the Termux package.
    Device,
}

/// Resolved variables for one stage.
///
/// `exports` are passed to the dispatched process; `placeholders` (a superset)
/// are what `{VAR}` templates in commands may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageEnvironment {
    exports: BTreeMap<String, String>,
    placeholders: BTreeMap<String, String>,
}

impl StageEnvironment {
    fn export(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        self.placeholders.insert(key.to_string(), value.clone());
        self.exports.insert(key.to_string(), value);
    }

    fn define(&mut self, key: &str, value: impl Into<String>) {
        self.placeholders.insert(key.to_string(), value.into());
    }

    /// Variables exported to the dispatched process.
    pub fn exports(&self) -> &BTreeMap<String, String> {
        &self.exports
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.placeholders.get(key).map(String::as_str)
    }

    /// Replace every `{VAR}` in `template`; unknown placeholders are an error.
    pub fn expand(&self, template: &str) -> Result<String, ResolveError> {
        let mut missing: Option<String> = None;
        let expanded = PLACEHOLDER_REGEX.replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match self.placeholders.get(key) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(placeholder) => Err(ResolveError::UnresolvedPlaceholder {
                placeholder,
                template: template.to_string(),
            }),
            None => Ok(expanded.into_owned()),
        }
    }

    pub fn expand_all(&self, templates: &[String]) -> Result<Vec<String>, ResolveError> {
        templates.iter().map(|t| self.expand(t)).collect()
    }
}

/// Maps `(BuildTarget, stage)` to environment variables by table lookup.
#[derive(Debug, Clone)]
pub struct ToolchainResolver {
    root: PathBuf,
    settings: ForgeSettings,
    stages: BTreeMap<String, Vec<VarGroup>>,
}

impl ToolchainResolver {
    /// Resolver for the built-in stage catalogue rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, settings: ForgeSettings) -> Self {
        let mut stages = BTreeMap::new();
        for (name, groups) in phases::stage_var_groups() {
            stages.insert(name.to_string(), groups.to_vec());
        }
        ToolchainResolver {
            root: root.into(),
            settings,
            stages,
        }
    }

    /// Make an additional stage name resolvable.
    pub fn register_stage(&mut self, name: impl Into<String>, groups: &[VarGroup]) {
        self.stages.insert(name.into(), groups.to_vec());
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &ForgeSettings {
        &self.settings
    }

    pub fn layout(&self, target: &BuildTarget) -> Layout {
        Layout::new(target, &self.settings)
    }

    pub fn resolve(
        &self,
        target: &BuildTarget,
        stage: &str,
    ) -> Result<StageEnvironment, ResolveError> {
        let groups = self
            .stages
            .get(stage)
            .ok_or_else(|| ResolveError::UnknownStage(stage.to_string()))?;

        let arch = arch_table(target.architecture);
        let layout = self.layout(target);
        let s = &self.settings;
        let abs = |p: &Path| self.root.join(p).to_string_lossy().into_owned();

        let mut env = StageEnvironment::default();

        // Layout: available to every stage as placeholders only
        env.define("CVFORGE_ROOT", self.root.to_string_lossy());
        env.define("API_LEVEL", target.api_level.to_string());
        env.define("ARCH", arch.ndk_arch);
        env.define("ABI", arch.abi);
        env.define("TOOLCHAIN_TRIPLE", arch.triple);
        env.define("NDK_VERSION", s.ndk_version.as_str());
        env.define(
            "NDK_URL",
            format!(
                "{}/{}",
                s.ndk_base_url.trim_end_matches('/'),
                tables::ndk_download_name(s)
            ),
        );
        env.define("NDK_ARCHIVE", abs(&layout.ndk_archive));
        env.define("NDK_DIR", abs(&layout.ndk_dir));
        env.define("NDK_ROOT", abs(&layout.ndk_root));
        env.define("TOOLCHAIN_DIR", abs(&layout.toolchain_dir));
        env.define("NUMPY_SRC", abs(&layout.numpy_src));
        env.define("NUMPY_REPO", s.numpy_repo.as_str());
        env.define("NUMPY_REF", s.numpy_ref.as_str());
        env.define("NUMPY_DIST", abs(&layout.numpy_dist));
        env.define("OPENCV_SRC", abs(&layout.opencv_src));
        env.define("OPENCV_REPO", s.opencv_repo.as_str());
        env.define("OPENCV_REF", s.opencv_ref.as_str());
        env.define("OPENCV_BUILD_DIR", abs(&layout.opencv_build_dir));
        env.define("CV2_MODULE", abs(&layout.cv2_module));
        env.define("TERMUX_ARCHIVE", abs(&layout.termux_archive));
        env.define("TERMUX_DIR", abs(&layout.termux_dir));
        env.define("TERMUX_PREFIX", abs(&layout.termux_prefix));
        env.define("CONTAINER_RUNTIME", s.container_runtime.as_str());
        env.define("DOCKCROSS_IMAGE", format!("dockcross/{}", s.dockcross_image));
        env.define("SETUP_SCRIPT", abs(&layout.setup_script));
        env.define("TEST_IMAGE", abs(&layout.test_image));

        for group in groups {
            match group {
                VarGroup::StandaloneToolchain => {
                    env.define(
                        "MAKE_STANDALONE_TOOLCHAIN",
                        abs(&layout.ndk_root.join("build/tools/make-standalone-toolchain.sh")),
                    );
                }
                VarGroup::NumpyCross => {
                    let bin = layout.toolchain_dir.join("bin");
                    let cc = abs(&bin.join(format!("{}-clang", arch.triple)));
                    let cxx = abs(&bin.join(format!("{}-clang++", arch.triple)));
                    let prefix = abs(&layout.termux_prefix);
                    env.export("CC", cc.clone());
                    env.export("CXX", cxx);
                    env.export("LDSHARED", cc);
                    env.export("CFLAGS", format!("-I{}/include/python2.7", prefix));
                    env.export("LDFLAGS", format!("{}/lib/libpython2.7.so -shared", prefix));
                }
                VarGroup::OpencvPython => {
                    let prefix = layout.termux_prefix.clone();
                    env.export(
                        "PYTHON2_INCLUDE_DIR",
                        format!("{}/", abs(&prefix.join("include/python2.7"))),
                    );
                    env.export(
                        "PYTHON2_LIBRARY",
                        abs(&prefix.join("lib/libpython2.7.so")),
                    );
                    env.export("PYTHON2_EXECUTABLE", abs(&prefix.join("bin/python2")));
                    env.export("PYTHON2_NUMPY_INCLUDE_DIRS", abs(&layout.numpy_include));
                    env.export("ANDROID_NDK", abs(&layout.ndk_root));
                    env.export("ANDROID_SDK", abs(&layout.android_sdk));
                }
                VarGroup::Device => {
                    let dir = s.device_download_dir.trim_end_matches('/');
                    env.define("TERMUX_PACKAGE", s.termux_package.as_str());
                    env.define("DEVICE_DIR", dir);
                    env.define(
                        "SETUP_SCRIPT_NAME",
                        s.termux_setup_script.as_str(),
                    );
                    env.define(
                        "DEVICE_SETUP_SCRIPT",
                        format!("{}/{}", dir, s.termux_setup_script),
                    );
                    env.define(
                        "DEVICE_TERMUX_ARCHIVE",
                        format!("{}/{}", dir, s.termux_archive),
                    );
                    env.define("DEVICE_CV2_MODULE", format!("{}/cv2.so", dir));
                    env.define(
                        "DEVICE_TEST_IMAGE",
                        format!("{}/{}", dir, s.smoke_test_image),
                    );
                }
            }
        }

        Ok(env)
    }
}
