//! cvforge: staged cross-build orchestrator for OpenCV and NumPy on Android.
//!
//! Builds the OpenCV Python module (`cv2.so`) and NumPy for one Android
//! target through an ordered list of stages that run on the host, inside a
//! cross-compilation container, or on an attached device. Every stage is
//! idempotent: it is skipped when its produced artifact already exists, so
//! an interrupted run resumes where it stopped.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Build target, execution environments and artifacts
//! - **config**: Settings file loading and validation
//! - **toolchain**: Per-stage environment resolution and template expansion
//! - **system**: Command dispatch (host and container) and the device bridge
//! - **orchestrator**: Stage catalogue, stage runner, gates and the run manifest
//! - **log_collector**: Decoupled disk logging behind the `log` facade

pub mod config;
pub mod error;
pub mod log_collector;
pub mod models;
pub mod orchestrator;
pub mod system;
pub mod toolchain;

// Re-export the log crate for macro usage
pub use log;

pub use error::{
    BridgeError, ConfigError, DispatchError, GateError, PipelineError, ResolveError, StageFailure,
    TargetError,
};

pub use models::{
    Architecture, Artifact, ArtifactKind, BuildTarget, ExecutionEnvironment, RuntimeEnvironment,
};

pub use config::ForgeSettings;

pub use log_collector::{LogCollector, LogLine};

pub use orchestrator::{
    ArtifactStore, AutoConfirm, ConfirmationGate, Pipeline, PipelineReport, PipelineState,
    RunOptions, Stage, StageResult, StageRunner, StageStatus,
};

pub use system::{
    AdbBridge, CommandDispatcher, ContainerSpec, DeviceBridge, ExitOutcome, ProcessDispatcher,
    RemoteShell,
};

pub use toolchain::{StageEnvironment, ToolchainResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
