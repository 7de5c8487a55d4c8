//! Build orchestration: a fixed, ordered stage list per build target.
//!
//! `Pipeline::run` walks the stages strictly in order through a
//! [`StageRunner`], records every outcome in a [`PipelineState`] that is
//! persisted after each stage, and halts at the first failure. Nothing is
//! rolled back: artifacts produced before the failure stay valid and their
//! stages are skipped on the next run.

pub mod checkpoint;
pub mod executor;
pub mod gate;
pub mod phases;
pub mod stages;
pub mod state;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub use checkpoint::ArtifactStore;
pub use executor::{SettleDelays, StageResult, StageRunner};
pub use gate::{AutoConfirm, ConfirmationGate, PromptGate, SignalFileGate, StdinGate};
pub use stages::{CommandTemplate, Confirmation, DeviceStep, GatePoint, Stage, StageAction};
pub use state::{PipelineState, StageRecord, StageStatus};

use crate::config::ForgeSettings;
use crate::error::{PipelineError, ResolveError, StageFailure};
use crate::models::{BuildTarget, ExecutionEnvironment};

/// Run-level switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Drop the recorded manifest and completion markers before running.
    pub reset_state: bool,
}

/// The stage that stopped a run and why.
#[derive(Debug)]
pub struct FailedStage {
    pub stage: String,
    pub reason: StageFailure,
}

/// Outcome of one `Pipeline::run`.
#[derive(Debug)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub failure: Option<FailedStage>,
}

impl PipelineReport {
    /// True when every stage was Skipped or Succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.state.stages.iter().all(|s| s.status.is_complete())
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.state
            .stages
            .iter()
            .filter(|s| s.status == status)
            .count()
    }
}

/// What a stage would do, with every template expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub name: String,
    pub environment: ExecutionEnvironment,
    /// Produced artifact already in place; the stage would be skipped.
    pub done: bool,
    pub working_dir: PathBuf,
    pub exports: BTreeMap<String, String>,
    pub commands: Vec<Vec<String>>,
    pub device_steps: Vec<DeviceStep>,
    pub confirmations: Vec<Confirmation>,
}

pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Custom pipeline; stage names must be unique.
    pub fn new(stages: Vec<Stage>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(PipelineError::DuplicateStage(stage.name.clone()));
            }
        }
        Ok(Pipeline { stages })
    }

    /// The built-in stage catalogue for `target`.
    pub fn for_target(
        target: &BuildTarget,
        settings: &ForgeSettings,
    ) -> Result<Self, PipelineError> {
        Pipeline::new(phases::catalogue(target, settings))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub async fn run(
        &self,
        runner: &StageRunner,
        target: &BuildTarget,
        options: RunOptions,
    ) -> Result<PipelineReport, PipelineError> {
        let root = runner.store().root().to_path_buf();

        if options.reset_state {
            log::info!("[Pipeline] Resetting recorded state and completion markers");
            runner.store().clear_markers()?;
        } else {
            match PipelineState::load(&root) {
                Ok(Some(previous)) => previous.ensure_target(target)?,
                Ok(None) => {}
                Err(PipelineError::State(reason)) => {
                    log::warn!("[Pipeline] Ignoring unreadable manifest: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }

        let mut state = PipelineState::new(*target, &self.stage_names());
        persist(&state, &root);

        log::info!(
            target: "parsed",
            "[Pipeline] Target {} with {} stages in {}",
            target,
            self.stages.len(),
            root.display()
        );

        let total = self.stages.len();
        let mut failure = None;
        for (index, stage) in self.stages.iter().enumerate() {
            log::info!(
                target: "parsed",
                "[Pipeline] [{}/{}] {}",
                index + 1,
                total,
                stage.name
            );
            match runner.execute(stage, target).await {
                StageResult::Skipped => state.record(index, StageStatus::Skipped, None),
                StageResult::Succeeded => state.record(index, StageStatus::Succeeded, None),
                StageResult::Failed(reason) => {
                    state.record(index, StageStatus::Failed, Some(reason.to_string()));
                    failure = Some(FailedStage {
                        stage: stage.name.clone(),
                        reason,
                    });
                }
            }
            persist(&state, &root);
            if failure.is_some() {
                break;
            }
        }

        match &failure {
            Some(failed) => log::error!(
                target: "parsed",
                "[Pipeline] Halted at '{}' ({})",
                failed.stage,
                failed.reason.kind()
            ),
            None => log::info!(target: "parsed", "[Pipeline] All {} stages complete", total),
        }

        Ok(PipelineReport { state, failure })
    }

    /// Expanded view of every stage without running anything.
    pub fn plan(
        &self,
        runner: &StageRunner,
        target: &BuildTarget,
    ) -> Result<Vec<PlannedStage>, ResolveError> {
        let store = runner.store();
        self.stages
            .iter()
            .map(|stage| -> Result<PlannedStage, ResolveError> {
                let env = runner.resolver().resolve(target, &stage.name)?;
                let (commands, device_steps) = match &stage.action {
                    StageAction::Commands(commands) => (
                        commands
                            .iter()
                            .map(|c| c.expand(&env))
                            .collect::<Result<Vec<_>, _>>()?,
                        Vec::new(),
                    ),
                    StageAction::Device(steps) => (
                        Vec::new(),
                        steps
                            .iter()
                            .map(|s| s.expand(&env))
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                };
                Ok(PlannedStage {
                    name: stage.name.clone(),
                    environment: stage.environment,
                    done: store.is_satisfied(&stage.name, &stage.produces),
                    working_dir: stage.cwd(store.root()),
                    exports: env.exports().clone(),
                    commands,
                    device_steps,
                    confirmations: stage.confirmations.clone(),
                })
            })
            .collect()
    }
}

/// The manifest is informational, so failing to write it never stops a run.
fn persist(state: &PipelineState, root: &Path) {
    if let Err(e) = state.save(root) {
        log::warn!("[Pipeline] Could not persist manifest: {}", e);
    }
}
