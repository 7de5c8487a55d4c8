//! Stage execution: idempotency check, dispatch, confirmation, verification.
//!
//! `StageRunner::execute` is the only place a stage's work is started. For
//! every stage it runs, in order:
//! 1. skip if the produced artifact is already in place
//! 2. fail with `MissingDependency` if a required artifact is absent
//! 3. resolve the stage environment and expand every template
//! 4. BeforeDispatch confirmations
//! 5. dispatch commands (or the device session) in the stage environment
//! 6. AfterDispatch confirmations
//! 7. write Marker artifacts, verify the produced artifact, mark complete

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ForgeSettings;
use crate::error::StageFailure;
use crate::models::{ArtifactKind, BuildTarget};
use crate::orchestrator::checkpoint::ArtifactStore;
use crate::orchestrator::gate::ConfirmationGate;
use crate::orchestrator::stages::{DeviceStep, GatePoint, Stage, StageAction};
use crate::system::{CommandDispatcher, DeviceBridge, RemoteShell};
use crate::toolchain::{StageEnvironment, ToolchainResolver};

/// Lines of captured output kept in a `CommandFailed` report.
pub const OUTPUT_TAIL_LINES: usize = 40;

#[derive(Debug)]
pub enum StageResult {
    Skipped,
    Succeeded,
    Failed(StageFailure),
}

impl StageResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageResult::Failed(_))
    }
}

/// Settle delays applied after unconfirmed device actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub launch: Duration,
    pub keystroke: Duration,
}

impl SettleDelays {
    pub fn from_settings(settings: &ForgeSettings) -> Self {
        SettleDelays {
            launch: settings.launch_settle(),
            keystroke: settings.keystroke_settle(),
        }
    }
}

/// Executes single stages against one working directory.
pub struct StageRunner {
    store: ArtifactStore,
    resolver: ToolchainResolver,
    dispatcher: Arc<dyn CommandDispatcher>,
    bridge: Option<Arc<dyn DeviceBridge>>,
    gate: Arc<dyn ConfirmationGate>,
    settle: SettleDelays,
}

impl StageRunner {
    pub fn new(
        store: ArtifactStore,
        resolver: ToolchainResolver,
        dispatcher: Arc<dyn CommandDispatcher>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Self {
        let settle = SettleDelays::from_settings(resolver.settings());
        StageRunner {
            store,
            resolver,
            dispatcher,
            bridge: None,
            gate,
            settle,
        }
    }

    /// Device stages fail with `BridgeUnavailable` until a bridge is attached.
    pub fn with_bridge(mut self, bridge: Arc<dyn DeviceBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_settle_delays(mut self, settle: SettleDelays) -> Self {
        self.settle = settle;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn resolver(&self) -> &ToolchainResolver {
        &self.resolver
    }

    pub async fn execute(&self, stage: &Stage, target: &BuildTarget) -> StageResult {
        if self.store.is_satisfied(&stage.name, &stage.produces) {
            log::info!(
                "[Stage] [{}] Skipped: {} already present",
                stage.name,
                stage.produces
            );
            return StageResult::Skipped;
        }

        match self.run_stage(stage, target).await {
            Ok(()) => {
                log::info!(target: "parsed", "[Stage] [{}] Succeeded", stage.name);
                StageResult::Succeeded
            }
            Err(failure) => {
                log::error!(target: "parsed", "[Stage] [{}] Failed: {}", stage.name, failure);
                StageResult::Failed(failure)
            }
        }
    }

    async fn run_stage(&self, stage: &Stage, target: &BuildTarget) -> Result<(), StageFailure> {
        if let Some(missing) = stage.requires.iter().find(|a| !self.store.exists(a)) {
            return Err(StageFailure::MissingDependency {
                artifact: missing.name.clone(),
                path: self.store.path_of(missing),
            });
        }

        let env = self.resolver.resolve(target, &stage.name)?;
        let plan = ExpandedAction::expand(&stage.action, &env)?;

        log::info!(target: "parsed", "[Stage] [{}] Starting ({})", stage.name, stage.environment);

        self.confirm(stage, GatePoint::BeforeDispatch).await?;

        match plan {
            ExpandedAction::Commands(commands) => {
                self.dispatch_commands(stage, &commands, env.exports()).await?
            }
            ExpandedAction::Device(steps) => self.run_device_session(stage, &steps).await?,
        }

        self.confirm(stage, GatePoint::AfterDispatch).await?;

        if stage.produces.kind == ArtifactKind::Marker {
            self.store.mark_complete(&stage.name)?;
        }
        if !self.store.exists(&stage.produces) {
            return Err(StageFailure::ArtifactNotProduced {
                artifact: stage.produces.name.clone(),
                path: self.store.path_of(&stage.produces),
            });
        }
        self.store.mark_complete(&stage.name)?;
        Ok(())
    }

    async fn confirm(&self, stage: &Stage, point: GatePoint) -> Result<(), StageFailure> {
        for confirmation in stage.confirmations_at(point) {
            log::info!("[Gate] [{}] Waiting for operator ({:?})", stage.name, point);
            self.gate.confirm(&stage.name, &confirmation.prompt).await?;
        }
        Ok(())
    }

    async fn dispatch_commands(
        &self,
        stage: &Stage,
        commands: &[Vec<String>],
        exports: &BTreeMap<String, String>,
    ) -> Result<(), StageFailure> {
        let cwd = stage.cwd(self.store.root());
        for argv in commands {
            let command = argv.join(" ");
            log::info!("[Stage] [{}] $ {}", stage.name, command);
            let outcome = self
                .dispatcher
                .run(stage.environment, argv, &cwd, exports)
                .await?;
            if !outcome.success() {
                return Err(StageFailure::CommandFailed {
                    command,
                    code: outcome.code,
                    output: tail(&outcome.captured_output, OUTPUT_TAIL_LINES),
                });
            }
        }
        Ok(())
    }

    async fn run_device_session(
        &self,
        stage: &Stage,
        steps: &[DeviceStep],
    ) -> Result<(), StageFailure> {
        let bridge = self.bridge.as_ref().ok_or_else(|| {
            StageFailure::BridgeUnavailable("no device bridge configured".to_string())
        })?;
        bridge.ensure_connected().await?;

        for step in steps {
            log::debug!("[Device] [{}] {}", stage.name, step);
            match step {
                DeviceStep::Push { local, remote } => {
                    bridge.push(self.store.root().join(local).as_path(), remote).await?
                }
                DeviceStep::Pull { remote, local } => {
                    bridge.pull(remote, self.store.root().join(local).as_path()).await?
                }
                DeviceStep::Launch { package } => {
                    bridge.launch_app(package).await?;
                    bridge.settle(self.settle.launch).await;
                }
                DeviceStep::Grant {
                    package,
                    permission,
                } => bridge.grant_permission(package, permission).await?,
                DeviceStep::Keys(text) => {
                    bridge.send(text).await?;
                    bridge.settle(self.settle.keystroke).await;
                }
                DeviceStep::Settle(duration) => bridge.settle(*duration).await,
            }
        }
        Ok(())
    }
}

/// A stage action with every template expanded.
enum ExpandedAction {
    Commands(Vec<Vec<String>>),
    Device(Vec<DeviceStep>),
}

impl ExpandedAction {
    fn expand(action: &StageAction, env: &StageEnvironment) -> Result<Self, StageFailure> {
        Ok(match action {
            StageAction::Commands(commands) => ExpandedAction::Commands(
                commands
                    .iter()
                    .map(|c| c.expand(env))
                    .collect::<Result<_, _>>()?,
            ),
            StageAction::Device(steps) => ExpandedAction::Device(
                steps
                    .iter()
                    .map(|s| s.expand(env))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// Last `lines` lines of `output`.
pub fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    let start = all.len().saturating_sub(lines);
    let mut kept = all[start..].join("\n");
    if start > 0 {
        kept = format!("... ({} earlier lines omitted)\n{}", start, kept);
    }
    kept
}
