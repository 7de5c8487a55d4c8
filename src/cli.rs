//! Command line interface definition

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use cvforge::models::RuntimeEnvironment;

/// cvforge - staged cross-build of OpenCV and NumPy for Android
#[derive(Parser)]
#[command(name = "cvforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Staged cross-build of OpenCV (cv2.so) and NumPy for Android")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Use alternate settings file (.json or .toml)
    #[arg(long, global = true, value_name = "PATH", env = "CVFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Working directory holding every artifact of the build
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Echo debug output (including command output) to the console
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Build target selection shared by `run` and `plan`
#[derive(Parser, Debug, Clone)]
pub struct TargetArgs {
    /// Target ABI or NDK architecture (x86, armeabi-v7a, arm64-v8a)
    #[arg(long, default_value = "armeabi-v7a")]
    pub abi: String,

    /// Android API level
    #[arg(long, default_value_t = 26)]
    pub api: u32,

    /// Where NumPy and the Python runtime are built
    #[arg(long, value_enum, default_value_t = RuntimeArg::Host)]
    pub runtime: RuntimeArg,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RuntimeArg {
    /// Cross-build NumPy inside the container
    Host,
    /// Build NumPy on the device with Termux
    Termux,
}

impl From<RuntimeArg> for RuntimeEnvironment {
    fn from(arg: RuntimeArg) -> Self {
        match arg {
            RuntimeArg::Host => RuntimeEnvironment::HostAndroidBuild,
            RuntimeArg::Termux => RuntimeEnvironment::DeviceTermuxBuild,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline, skipping stages whose artifacts already exist
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Confirm every operator gate automatically
        #[arg(short, long)]
        yes: bool,

        /// Acknowledge gates by creating this file instead of answering on stdin
        #[arg(long, value_name = "PATH", conflicts_with = "yes")]
        signal_file: Option<PathBuf>,

        /// Forget the recorded target and completion markers before running
        #[arg(long)]
        reset_state: bool,
    },

    /// Show every stage with expanded commands, without running anything
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show the recorded state of the last run in the working directory
    Status,

    /// Print the keystroke encoding of TEXT as sent to the device
    Keys {
        /// Text to encode
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["cvforge", "run"]).unwrap();
        match cli.command {
            Commands::Run {
                target,
                yes,
                signal_file,
                reset_state,
            } => {
                assert_eq!(target.abi, "armeabi-v7a");
                assert_eq!(target.api, 26);
                assert_eq!(target.runtime, RuntimeArg::Host);
                assert!(!yes);
                assert!(signal_file.is_none());
                assert!(!reset_state);
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.global.workdir, PathBuf::from("."));
    }

    #[test]
    fn test_yes_conflicts_with_signal_file() {
        let result = Cli::try_parse_from(["cvforge", "run", "--yes", "--signal-file", "go"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cvforge",
            "plan",
            "--runtime",
            "termux",
            "--workdir",
            "/tmp/build",
            "-v",
        ])
        .unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.workdir, PathBuf::from("/tmp/build"));
        match cli.command {
            Commands::Plan { target } => assert_eq!(target.runtime, RuntimeArg::Termux),
            _ => panic!("expected plan"),
        }
    }
}
