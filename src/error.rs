//! Unified error type hierarchy for cvforge
//!
//! Provides structured error handling with TargetError, ConfigError,
//! DispatchError, ResolveError, GateError, BridgeError, StageFailure and
//! PipelineError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Build target selection errors (CLI parsing, settings).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("Unknown architecture: {0} (expected x86, arm, arm64, armeabi-v7a or arm64-v8a)")]
    UnknownArchitecture(String),

    #[error("Unknown runtime environment: {0} (expected host or termux)")]
    UnknownRuntime(String),

    #[error("API level {0} is below the minimum supported level {1}")]
    ApiLevelTooLow(u32, u32),
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Failures of the command dispatch layer itself (not non-zero exits).
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Refusing to dispatch an empty command")]
    EmptyCommand,

    #[error("Device commands must go through the device bridge")]
    DeviceRequiresBridge,

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error while collecting output of '{program}': {source}")]
    Output {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Toolchain resolution and template expansion errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No toolchain environment is defined for stage '{0}'")]
    UnknownStage(String),

    #[error("Unresolved placeholder '{{{placeholder}}}' in '{template}'")]
    UnresolvedPlaceholder {
        placeholder: String,
        template: String,
    },
}

/// Operator confirmation gate errors.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Operator input closed before confirmation")]
    InputClosed,

    #[error("Operator aborted at '{0}'")]
    Aborted(String),

    #[error("IO error while waiting for confirmation: {0}")]
    Io(#[from] io::Error),
}

/// Debug bridge failures.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no responsive device: {0}")]
    Unavailable(String),

    #[error("`{command}` failed with exit code {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The on-device input method cannot reproduce this text.
    #[error("cannot type {text:?}: {reason}")]
    Untypeable { text: String, reason: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("IO error on the host side of a transfer: {0}")]
    Io(#[from] io::Error),
}

/// Reason a single stage failed. Every variant is fatal for the run.
#[derive(Error, Debug)]
pub enum StageFailure {
    /// An upstream artifact is absent; indicates an ordering bug.
    #[error("missing dependency: {artifact} ({})", .path.display())]
    MissingDependency { artifact: String, path: PathBuf },

    /// A dispatched process exited non-zero.
    #[error("command `{command}` exited with {}\n{output}", describe_code(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The command reported success but the expected output is absent.
    #[error("artifact not produced: {artifact} ({})", .path.display())]
    ArtifactNotProduced { artifact: String, path: PathBuf },

    /// No responsive device behind the debug bridge.
    #[error("device bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// A keystroke line the device cannot receive verbatim.
    #[error("cannot type {text:?} on the device: {reason}")]
    Untypeable { text: String, reason: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("confirmation failed: {0}")]
    Confirmation(#[from] GateError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<BridgeError> for StageFailure {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Unavailable(reason) => StageFailure::BridgeUnavailable(reason),
            BridgeError::CommandFailed {
                command,
                code,
                output,
            } => StageFailure::CommandFailed {
                command,
                code,
                output,
            },
            BridgeError::Untypeable { text, reason } => StageFailure::Untypeable { text, reason },
            BridgeError::Dispatch(e) => StageFailure::Dispatch(e),
            BridgeError::Io(e) => StageFailure::Io(e),
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl StageFailure {
    /// Short machine-friendly label used in the manifest and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            StageFailure::MissingDependency { .. } => "MissingDependency",
            StageFailure::CommandFailed { .. } => "CommandFailed",
            StageFailure::ArtifactNotProduced { .. } => "ArtifactNotProduced",
            StageFailure::BridgeUnavailable(_) => "BridgeUnavailable",
            StageFailure::Untypeable { .. } => "Untypeable",
            StageFailure::Dispatch(_) => "DispatchFailed",
            StageFailure::Resolve(_) => "ResolveFailed",
            StageFailure::Confirmation(_) => "ConfirmationFailed",
            StageFailure::Io(_) => "Io",
        }
    }
}

/// Pipeline construction and run-level errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{0}' is declared more than once")]
    DuplicateStage(String),

    #[error("Working directory was last used for target {recorded}, refusing to continue with {requested} (use --reset-state)")]
    TargetMismatch { recorded: String, requested: String },

    #[error("Pipeline state error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::State(e.to_string())
    }
}
