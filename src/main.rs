mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cli::{Cli, Commands, TargetArgs};
use cvforge::config::{resolve_settings, ForgeSettings};
use cvforge::log_collector::{logs_dir_for, LogCollector};
use cvforge::models::{Architecture, BuildTarget};
use cvforge::orchestrator::{
    ArtifactStore, AutoConfirm, ConfirmationGate, GatePoint, Pipeline, PipelineState,
    PromptGate, RunOptions, SignalFileGate, StageRunner, StageStatus,
};
use cvforge::system::keystrokes::encode_keystrokes;
use cvforge::system::{AdbBridge, ContainerSpec, ProcessDispatcher};
use cvforge::toolchain::ToolchainResolver;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let workdir = absolute(&cli.global.workdir)?;

    match cli.command {
        Commands::Keys { text } => {
            println!("{}", encode_keystrokes(&text)?);
            Ok(())
        }
        Commands::Status => show_status(&workdir),
        Commands::Plan { target } => {
            let collector = start_logging(&workdir, cli.global.verbose)?;
            let result = plan(&workdir, cli.global.config.as_deref(), &target);
            finish_logging(&collector);
            result
        }
        Commands::Run {
            target,
            yes,
            signal_file,
            reset_state,
        } => {
            std::fs::create_dir_all(&workdir)
                .with_context(|| format!("Cannot create working directory {}", workdir.display()))?;
            let collector = start_logging(&workdir, cli.global.verbose)?;
            let result = run(
                &workdir,
                cli.global.config.as_deref(),
                &target,
                yes,
                signal_file,
                reset_state,
            )
            .await;
            finish_logging(&collector);
            result
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    Ok(cwd.join(path).components().collect())
}

/// Wire the LogCollector as the global logger for the `log` crate.
fn start_logging(workdir: &Path, verbose: bool) -> Result<LogCollector> {
    let console_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let collector = LogCollector::new(logs_dir_for(workdir), console_level)
        .map_err(anyhow::Error::msg)?;
    if let Err(e) = collector.install() {
        eprintln!("WARNING: Failed to register log collector: {}", e);
    }
    log::debug!(
        "[Main] Logging to {} and {}",
        collector.session().full.display(),
        collector.session().parsed.display()
    );
    Ok(collector)
}

fn finish_logging(collector: &LogCollector) {
    if let Err(e) = collector.wait_for_empty() {
        eprintln!("WARNING: Failed to flush logs: {}", e);
    }
}

fn build_target(args: &TargetArgs) -> Result<BuildTarget> {
    let architecture: Architecture = args.abi.parse()?;
    Ok(BuildTarget::new(
        architecture,
        args.api,
        args.runtime.into(),
    )?)
}

fn container_spec(settings: &ForgeSettings, workdir: &Path) -> ContainerSpec {
    ContainerSpec {
        runtime: settings.container_runtime.clone(),
        image: format!("dockcross/{}", settings.dockcross_image),
        host_root: workdir.to_path_buf(),
        mount: settings.container_mount.clone(),
    }
}

async fn run(
    workdir: &Path,
    config: Option<&Path>,
    args: &TargetArgs,
    yes: bool,
    signal_file: Option<PathBuf>,
    reset_state: bool,
) -> Result<()> {
    let target = build_target(args)?;
    let settings = resolve_settings(config)?;
    let pipeline = Pipeline::for_target(&target, &settings)?;

    let dispatcher = Arc::new(ProcessDispatcher::new(container_spec(&settings, workdir)));
    let bridge = Arc::new(AdbBridge::new(
        dispatcher.clone(),
        settings.adb_binary.clone(),
        workdir,
    ));
    let gate: Arc<dyn ConfirmationGate> = if yes {
        Arc::new(AutoConfirm)
    } else if let Some(path) = signal_file {
        Arc::new(SignalFileGate::new(path, settings.signal_poll()))
    } else {
        Arc::new(PromptGate::stdin())
    };

    let store = ArtifactStore::new(workdir).with_strict_markers(settings.strict_markers);
    let resolver = ToolchainResolver::new(workdir, settings);
    let runner = StageRunner::new(store, resolver, dispatcher, gate).with_bridge(bridge);

    let report = pipeline
        .run(&runner, &target, RunOptions { reset_state })
        .await?;

    println!(
        "{}: {} succeeded, {} skipped, {} pending",
        target,
        report.count(StageStatus::Succeeded),
        report.count(StageStatus::Skipped),
        report.count(StageStatus::Pending)
    );

    if let Some(failed) = report.failure {
        bail!("stage '{}' failed: {}", failed.stage, failed.reason);
    }
    Ok(())
}

fn plan(workdir: &Path, config: Option<&Path>, args: &TargetArgs) -> Result<()> {
    let target = build_target(args)?;
    let settings = resolve_settings(config)?;
    let pipeline = Pipeline::for_target(&target, &settings)?;

    let dispatcher = Arc::new(ProcessDispatcher::new(container_spec(&settings, workdir)));
    let store = ArtifactStore::new(workdir).with_strict_markers(settings.strict_markers);
    let resolver = ToolchainResolver::new(workdir, settings);
    let runner = StageRunner::new(store, resolver, dispatcher.clone(), Arc::new(AutoConfirm));

    println!("Plan for {} in {}", target, workdir.display());
    for (index, stage) in pipeline.plan(&runner, &target)?.iter().enumerate() {
        println!(
            "\n[{}] {} ({}){}",
            index + 1,
            stage.name,
            stage.environment,
            if stage.done { " - done, will skip" } else { "" }
        );
        println!("    cwd: {}", stage.working_dir.display());
        for confirmation in &stage.confirmations {
            if confirmation.point == GatePoint::BeforeDispatch {
                println!("    confirm: {}", confirmation.prompt);
            }
        }
        for argv in &stage.commands {
            let invocation = dispatcher.host_invocation(
                stage.environment,
                argv,
                &stage.working_dir,
                &stage.exports,
            )?;
            println!("    $ {}", invocation.join(" "));
        }
        for step in &stage.device_steps {
            println!("    device: {}", step);
        }
        for confirmation in &stage.confirmations {
            if confirmation.point == GatePoint::AfterDispatch {
                println!("    confirm: {}", confirmation.prompt);
            }
        }
    }
    Ok(())
}

fn show_status(workdir: &Path) -> Result<()> {
    let Some(state) = PipelineState::load(workdir)? else {
        println!("No recorded run in {}", workdir.display());
        return Ok(());
    };

    println!("Target:  {}", state.target);
    println!("Started: {}", state.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", state.updated_at.format("%Y-%m-%d %H:%M:%S"));
    for record in &state.stages {
        match &record.detail {
            Some(detail) => println!(
                "  {:<24} {:<9} {}",
                record.name,
                record.status.as_str(),
                detail
            ),
            None => println!("  {:<24} {}", record.name, record.status),
        }
    }
    if let Some(failed) = state.first_failure() {
        println!("\nLast run stopped at '{}'", failed.name);
    }
    Ok(())
}
