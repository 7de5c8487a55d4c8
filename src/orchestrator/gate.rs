//! Operator confirmation gates.
//!
//! A gate blocks the pipeline until a human acknowledges an action that
//! automation cannot observe. Gates have no timeout: the gated work (device
//! setup, a manual edit) runs at human pace.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

use crate::error::GateError;

pub trait ConfirmationGate: Send + Sync {
    /// Resolve once the operator acknowledged `prompt` for `stage`.
    fn confirm<'a>(&'a self, stage: &'a str, prompt: &'a str)
        -> BoxFuture<'a, Result<(), GateError>>;
}

/// Confirms immediately (`--yes`, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm<'a>(
        &'a self,
        stage: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), GateError>> {
        async move {
            log::info!("[Gate] [{}] Auto-confirmed: {}", stage, prompt);
            Ok(())
        }
        .boxed()
    }
}

/// Prompts on stderr and waits for a line of input.
///
/// An empty line, `y` or `yes` confirms; `n`, `no`, `q` or `abort` aborts the
/// run; end of input is an error.
pub struct PromptGate<R> {
    input: Mutex<R>,
}

/// The production prompt gate, reading the process' stdin.
pub type StdinGate = PromptGate<BufReader<Stdin>>;

impl PromptGate<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        PromptGate::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> PromptGate<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        PromptGate {
            input: Mutex::new(input),
        }
    }

    async fn wait(&self, stage: &str, prompt: &str) -> Result<(), GateError> {
        let mut input = self.input.lock().await;
        loop {
            eprintln!("\n[{}] {} [Y/n] ", stage, prompt);
            let mut line = String::new();
            if input.read_line(&mut line).await? == 0 {
                return Err(GateError::InputClosed);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "" | "y" | "yes" => {
                    log::info!("[Gate] [{}] Operator confirmed", stage);
                    return Ok(());
                }
                "n" | "no" | "q" | "abort" => {
                    log::warn!("[Gate] [{}] Operator aborted", stage);
                    return Err(GateError::Aborted(stage.to_string()));
                }
                other => {
                    eprintln!("Unrecognized answer '{}', expected y or n", other);
                }
            }
        }
    }
}

impl<R> ConfirmationGate for PromptGate<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn confirm<'a>(
        &'a self,
        stage: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), GateError>> {
        self.wait(stage, prompt).boxed()
    }
}

/// Waits for a signal file to appear, then consumes it.
///
/// Lets an external tool (or an operator on another terminal) acknowledge a
/// gate with `touch <path>`.
#[derive(Debug, Clone)]
pub struct SignalFileGate {
    path: PathBuf,
    poll: Duration,
}

impl SignalFileGate {
    pub fn new(path: impl Into<PathBuf>, poll: Duration) -> Self {
        SignalFileGate {
            path: path.into(),
            poll,
        }
    }

    async fn wait(&self, stage: &str, prompt: &str) -> Result<(), GateError> {
        log::info!(
            "[Gate] [{}] {} (waiting for {})",
            stage,
            prompt,
            self.path.display()
        );
        while !tokio::fs::try_exists(&self.path).await? {
            tokio::time::sleep(self.poll).await;
        }
        tokio::fs::remove_file(&self.path).await?;
        log::info!("[Gate] [{}] Signal received", stage);
        Ok(())
    }
}

impl ConfirmationGate for SignalFileGate {
    fn confirm<'a>(
        &'a self,
        stage: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), GateError>> {
        self.wait(stage, prompt).boxed()
    }
}
