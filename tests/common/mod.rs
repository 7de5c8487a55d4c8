//! Shared fakes for the integration tests.
#![allow(dead_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cvforge::error::{BridgeError, DispatchError};
use cvforge::models::{ArtifactKind, BuildTarget, ExecutionEnvironment};
use cvforge::orchestrator::{Pipeline, StageRunner};
use cvforge::system::{CommandDispatcher, DeviceBridge, ExitOutcome, RemoteShell};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub environment: ExecutionEnvironment,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
}

/// Records every dispatch and, when a stage's last command runs, creates the
/// artifact that stage produces.
#[derive(Default)]
pub struct MaterializingDispatcher {
    calls: Mutex<Vec<Call>>,
    outputs: Mutex<HashMap<Vec<String>, (PathBuf, ArtifactKind)>>,
    failing: Mutex<Option<String>>,
}

impl MaterializingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Learn the final command of every command stage in `pipeline`.
    pub fn learn(&self, pipeline: &Pipeline, runner: &StageRunner, target: &BuildTarget) {
        let planned = pipeline.plan(runner, target).unwrap();
        let mut outputs = self.outputs.lock().unwrap();
        for (stage, plan) in pipeline.stages().iter().zip(planned) {
            if let Some(last) = plan.commands.last() {
                outputs.insert(
                    last.clone(),
                    (runner.store().path_of(&stage.produces), stage.produces.kind),
                );
            }
        }
    }

    /// Any command whose program is `program` exits 1 without producing anything.
    pub fn fail_program(&self, program: &str) {
        *self.failing.lock().unwrap() = Some(program.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.argv[0].clone())
            .collect()
    }
}

impl CommandDispatcher for MaterializingDispatcher {
    fn run<'a>(
        &'a self,
        environment: ExecutionEnvironment,
        argv: &'a [String],
        cwd: &'a Path,
        _extra_env: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<ExitOutcome, DispatchError>> {
        self.calls.lock().unwrap().push(Call {
            environment,
            argv: argv.to_vec(),
            cwd: cwd.to_path_buf(),
        });

        let fails = self.failing.lock().unwrap().as_deref() == Some(argv[0].as_str());
        if !fails {
            if let Some((path, kind)) = self.outputs.lock().unwrap().get(argv) {
                materialize(path, *kind);
            }
        }

        let outcome = ExitOutcome {
            code: Some(if fails { 1 } else { 0 }),
            captured_output: if fails { "boom".to_string() } else { String::new() },
        };
        async move { Ok(outcome) }.boxed()
    }
}

pub fn materialize(path: &Path, kind: ArtifactKind) {
    match kind {
        ArtifactKind::File => {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"artifact").unwrap();
        }
        ArtifactKind::Directory => std::fs::create_dir_all(path).unwrap(),
        ArtifactKind::NonEmptyDirectory => {
            std::fs::create_dir_all(path).unwrap();
            std::fs::write(path.join("content"), b"artifact").unwrap();
        }
        // Written by the runner itself
        ArtifactKind::Marker => {}
    }
}

/// In-memory device: records every action, pulls create the local file.
pub struct FakeBridge {
    connected: bool,
    log: Mutex<Vec<String>>,
}

impl FakeBridge {
    pub fn connected() -> Arc<Self> {
        Arc::new(FakeBridge {
            connected: true,
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(FakeBridge {
            connected: false,
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn note(&self, entry: String) -> BoxFuture<'_, Result<(), BridgeError>> {
        self.log.lock().unwrap().push(entry);
        async { Ok(()) }.boxed()
    }
}

impl RemoteShell for FakeBridge {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), BridgeError>> {
        self.note(format!("send {}", text))
    }

    fn settle(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        async {}.boxed()
    }
}

impl DeviceBridge for FakeBridge {
    fn ensure_connected(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        let connected = self.connected;
        async move {
            if connected {
                Ok(())
            } else {
                Err(BridgeError::Unavailable("no devices/emulators found".to_string()))
            }
        }
        .boxed()
    }

    fn push<'a>(
        &'a self,
        local: &'a Path,
        remote: &'a str,
    ) -> BoxFuture<'a, Result<(), BridgeError>> {
        self.note(format!("push {} {}", local.display(), remote))
    }

    fn pull<'a>(
        &'a self,
        remote: &'a str,
        local: &'a Path,
    ) -> BoxFuture<'a, Result<(), BridgeError>> {
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(local, b"pulled").unwrap();
        self.note(format!("pull {}", remote))
    }

    fn launch_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), BridgeError>> {
        self.note(format!("launch {}", package))
    }

    fn grant_permission<'a>(
        &'a self,
        package: &'a str,
        permission: &'a str,
    ) -> BoxFuture<'a, Result<(), BridgeError>> {
        self.note(format!("grant {} {}", package, permission))
    }
}
