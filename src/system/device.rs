//! Device bridge: file transfer and blind keystroke injection over adb.
//!
//! The on-device Termux shell offers no structured response channel. Text is
//! typed into it with `input keyboard text` and nothing is read back, so every
//! injected line must be followed by a settle delay before the next one. A
//! remote command slower than its delay silently desynchronises the sequence;
//! that is a known reliability boundary of this environment.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::BridgeError;
use crate::models::ExecutionEnvironment;
use crate::system::keystrokes::{encode_keystrokes, KEYCODE_ENTER};
use crate::system::{CommandDispatcher, ExitOutcome};

/// Best-effort, unconfirmed command channel into a remote interactive shell.
pub trait RemoteShell: Send + Sync {
    /// Type `text` followed by ENTER. No acknowledgment is read back.
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), BridgeError>>;

    /// Wait for an unconfirmed remote action to (probably) take effect.
    fn settle(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// File transfer and app control on the single attached device.
pub trait DeviceBridge: RemoteShell {
    fn ensure_connected(&self) -> BoxFuture<'_, Result<(), BridgeError>>;

    fn push<'a>(&'a self, local: &'a Path, remote: &'a str)
        -> BoxFuture<'a, Result<(), BridgeError>>;

    fn pull<'a>(&'a self, remote: &'a str, local: &'a Path)
        -> BoxFuture<'a, Result<(), BridgeError>>;

    /// Bring the interactive shell application to the foreground.
    fn launch_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), BridgeError>>;

    fn grant_permission<'a>(
        &'a self,
        package: &'a str,
        permission: &'a str,
    ) -> BoxFuture<'a, Result<(), BridgeError>>;
}

/// `DeviceBridge` backed by the `adb` binary, run through a local dispatcher.
pub struct AdbBridge {
    dispatcher: Arc<dyn CommandDispatcher>,
    adb: String,
    cwd: PathBuf,
    no_env: BTreeMap<String, String>,
}

impl AdbBridge {
    pub fn new(
        dispatcher: Arc<dyn CommandDispatcher>,
        adb: impl Into<String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        AdbBridge {
            dispatcher,
            adb: adb.into(),
            cwd: cwd.into(),
            no_env: BTreeMap::new(),
        }
    }

    fn argv(&self, args: &[&str]) -> Vec<String> {
        std::iter::once(self.adb.as_str())
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    /// Run `adb <args>`; a missing adb binary means no bridge at all.
    async fn adb_raw(&self, args: &[&str]) -> Result<(String, ExitOutcome), BridgeError> {
        let argv = self.argv(args);
        let outcome = self
            .dispatcher
            .run(ExecutionEnvironment::Local, &argv, &self.cwd, &self.no_env)
            .await
            .map_err(|e| BridgeError::Unavailable(e.to_string()))?;
        Ok((argv.join(" "), outcome))
    }

    async fn adb(&self, args: &[&str]) -> Result<(), BridgeError> {
        let (command, outcome) = self.adb_raw(args).await?;
        if outcome.success() {
            Ok(())
        } else {
            Err(BridgeError::CommandFailed {
                command,
                code: outcome.code,
                output: outcome.captured_output,
            })
        }
    }

    async fn type_line(&self, text: &str) -> Result<(), BridgeError> {
        let encoded = encode_keystrokes(text)?;
        log::info!("[Device] Sending keystrokes: {}", text);
        self.adb(&["shell", "input", "keyboard", "text", &encoded])
            .await?;
        self.adb(&["shell", "input", "keyevent", &KEYCODE_ENTER.to_string()])
            .await
    }

    async fn check_state(&self) -> Result<(), BridgeError> {
        let (_, outcome) = self.adb_raw(&["get-state"]).await?;
        let state = outcome.captured_output.trim();
        if outcome.success() && state == "device" {
            log::debug!("[Device] Bridge state: {}", state);
            Ok(())
        } else {
            Err(BridgeError::Unavailable(if state.is_empty() {
                format!("adb get-state exited with {:?}", outcome.code)
            } else {
                state.to_string()
            }))
        }
    }

    async fn pull_into(&self, remote: &str, local: &Path) -> Result<(), BridgeError> {
        if let Some(parent) = local.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let local = local.to_string_lossy();
        self.adb(&["pull", remote, &local]).await
    }
}

impl RemoteShell for AdbBridge {
    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), BridgeError>> {
        self.type_line(text).boxed()
    }

    fn settle(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

impl DeviceBridge for AdbBridge {
    fn ensure_connected(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        self.check_state().boxed()
    }

    fn push<'a>(
        &'a self,
        local: &'a Path,
        remote: &'a str,
    ) -> BoxFuture<'a, Result<(), BridgeError>> {
        async move {
            log::info!("[Device] Pushing {} -> {}", local.display(), remote);
            let local = local.to_string_lossy();
            self.adb(&["push", &local, remote]).await
        }
        .boxed()
    }

    fn pull<'a>(
        &'a self,
        remote: &'a str,
        local: &'a Path,
    ) -> BoxFuture<'a, Result<(), BridgeError>> {
        async move {
            log::info!("[Device] Pulling {} -> {}", remote, local.display());
            self.pull_into(remote, local).await
        }
        .boxed()
    }

    fn launch_app<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), BridgeError>> {
        async move {
            log::info!("[Device] Launching {}", package);
            self.adb(&["shell", "monkey", "-p", package, "1"]).await
        }
        .boxed()
    }

    fn grant_permission<'a>(
        &'a self,
        package: &'a str,
        permission: &'a str,
    ) -> BoxFuture<'a, Result<(), BridgeError>> {
        async move {
            log::info!("[Device] Granting {} to {}", permission, package);
            self.adb(&["shell", "pm", "grant", package, permission]).await
        }
        .boxed()
    }
}
