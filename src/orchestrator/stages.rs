//! Stage definitions: what a stage runs, where, and what it must leave behind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ResolveError;
use crate::models::{Artifact, ExecutionEnvironment};
use crate::toolchain::StageEnvironment;

/// An argv whose elements may contain `{VAR}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    pub fn new<S: AsRef<str>>(argv: &[S]) -> Self {
        CommandTemplate {
            argv: argv.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn expand(&self, env: &StageEnvironment) -> Result<Vec<String>, ResolveError> {
        env.expand_all(&self.argv)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// One step of a scripted device session. String fields are templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStep {
    /// Host path to device path.
    Push { local: String, remote: String },
    /// Device path to host path.
    Pull { remote: String, local: String },
    /// Foreground the app, then wait the launch settle delay.
    Launch { package: String },
    Grant { package: String, permission: String },
    /// Blind keystrokes plus ENTER, then wait the keystroke settle delay.
    Keys(String),
    /// Extra wait on top of the automatic settle delays.
    Settle(Duration),
}

impl DeviceStep {
    pub fn push(local: &str, remote: &str) -> Self {
        DeviceStep::Push {
            local: local.to_string(),
            remote: remote.to_string(),
        }
    }

    pub fn pull(remote: &str, local: &str) -> Self {
        DeviceStep::Pull {
            remote: remote.to_string(),
            local: local.to_string(),
        }
    }

    pub fn launch(package: &str) -> Self {
        DeviceStep::Launch {
            package: package.to_string(),
        }
    }

    pub fn grant(package: &str, permission: &str) -> Self {
        DeviceStep::Grant {
            package: package.to_string(),
            permission: permission.to_string(),
        }
    }

    pub fn keys(text: &str) -> Self {
        DeviceStep::Keys(text.to_string())
    }

    /// Copy of this step with every template field expanded.
    pub fn expand(&self, env: &StageEnvironment) -> Result<DeviceStep, ResolveError> {
        Ok(match self {
            DeviceStep::Push { local, remote } => DeviceStep::Push {
                local: env.expand(local)?,
                remote: env.expand(remote)?,
            },
            DeviceStep::Pull { remote, local } => DeviceStep::Pull {
                remote: env.expand(remote)?,
                local: env.expand(local)?,
            },
            DeviceStep::Launch { package } => DeviceStep::Launch {
                package: env.expand(package)?,
            },
            DeviceStep::Grant {
                package,
                permission,
            } => DeviceStep::Grant {
                package: env.expand(package)?,
                permission: env.expand(permission)?,
            },
            // Keystroke text is typed verbatim into Python and sh; only
            // uppercase `{VAR}` forms are placeholders, so `{x}` survives.
            DeviceStep::Keys(text) => DeviceStep::Keys(env.expand(text)?),
            DeviceStep::Settle(duration) => DeviceStep::Settle(*duration),
        })
    }
}

impl fmt::Display for DeviceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStep::Push { local, remote } => write!(f, "push {} -> {}", local, remote),
            DeviceStep::Pull { remote, local } => write!(f, "pull {} -> {}", remote, local),
            DeviceStep::Launch { package } => write!(f, "launch {}", package),
            DeviceStep::Grant {
                package,
                permission,
            } => write!(f, "grant {} {}", package, permission),
            DeviceStep::Keys(text) => write!(f, "keys {:?}", text),
            DeviceStep::Settle(duration) => write!(f, "settle {}ms", duration.as_millis()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageAction {
    /// Run in sequence in the stage's environment, stopping at the first failure.
    Commands(Vec<CommandTemplate>),
    /// Scripted device session through the bridge.
    Device(Vec<DeviceStep>),
}

/// When an operator gate blocks relative to the stage's dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePoint {
    BeforeDispatch,
    AfterDispatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub prompt: String,
    pub point: GatePoint,
}

/// One unit of the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub environment: ExecutionEnvironment,
    pub action: StageAction,
    pub requires: Vec<Artifact>,
    pub produces: Artifact,
    pub confirmations: Vec<Confirmation>,
    /// Relative to the working directory; the root when unset.
    pub working_dir: Option<PathBuf>,
}

impl Stage {
    /// Command stage. Every template is a full argv.
    pub fn commands(
        name: &str,
        environment: ExecutionEnvironment,
        commands: &[&[&str]],
        produces: Artifact,
    ) -> Self {
        Stage::new(
            name,
            environment,
            StageAction::Commands(commands.iter().map(|argv| CommandTemplate::new(*argv)).collect()),
            produces,
        )
    }

    /// Device session stage. Produces its own completion marker unless overridden.
    pub fn device(name: &str, steps: Vec<DeviceStep>) -> Self {
        Stage::new(
            name,
            ExecutionEnvironment::Device,
            StageAction::Device(steps),
            Artifact::marker(name),
        )
    }

    /// Stage with no automation at all: the operator does the work.
    pub fn manual(name: &str, prompt: &str) -> Self {
        Stage::new(
            name,
            ExecutionEnvironment::Local,
            StageAction::Commands(Vec::new()),
            Artifact::marker(name),
        )
        .confirm_after(prompt)
    }

    fn new(
        name: &str,
        environment: ExecutionEnvironment,
        action: StageAction,
        produces: Artifact,
    ) -> Self {
        Stage {
            name: name.to_string(),
            environment,
            action,
            requires: Vec::new(),
            produces,
            confirmations: Vec::new(),
            working_dir: None,
        }
    }

    pub fn requires(mut self, artifact: Artifact) -> Self {
        self.requires.push(artifact);
        self
    }

    pub fn produces(mut self, artifact: Artifact) -> Self {
        self.produces = artifact;
        self
    }

    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn confirm_before(mut self, prompt: &str) -> Self {
        self.confirmations.push(Confirmation {
            prompt: prompt.to_string(),
            point: GatePoint::BeforeDispatch,
        });
        self
    }

    pub fn confirm_after(mut self, prompt: &str) -> Self {
        self.confirmations.push(Confirmation {
            prompt: prompt.to_string(),
            point: GatePoint::AfterDispatch,
        });
        self
    }

    /// Host directory the stage's commands run in.
    pub fn cwd(&self, root: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        }
    }

    pub fn requires_operator_confirmation(&self) -> bool {
        !self.confirmations.is_empty()
    }

    pub fn confirmations_at(&self, point: GatePoint) -> impl Iterator<Item = &Confirmation> {
        self.confirmations.iter().filter(move |c| c.point == point)
    }
}
