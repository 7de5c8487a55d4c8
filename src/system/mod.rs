//! System module: environment-scoped command dispatch and the device bridge.
//!
//! - `CommandDispatcher` runs an argv in the Local or Container environment
//! - `device` drives the attached Android device over adb
//! - `keystrokes` encodes text for blind keystroke injection

pub mod device;
pub mod keystrokes;

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::DispatchError;
use crate::models::ExecutionEnvironment;

pub use device::{AdbBridge, DeviceBridge, RemoteShell};

/// Exit status and merged output of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub captured_output: String,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes a command in one execution environment.
///
/// Non-zero exits are returned as an `ExitOutcome`, not as an error; the
/// dispatcher never retries.
pub trait CommandDispatcher: Send + Sync {
    fn run<'a>(
        &'a self,
        environment: ExecutionEnvironment,
        argv: &'a [String],
        cwd: &'a Path,
        extra_env: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<ExitOutcome, DispatchError>>;
}

/// How Container commands are wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container runtime binary (`docker`, `podman`).
    pub runtime: String,
    /// Cross-toolchain image, e.g. `dockcross/linux-x86`.
    pub image: String,
    /// Host working directory that is bind-mounted.
    pub host_root: PathBuf,
    /// Fixed in-container mount point of `host_root`.
    pub mount: String,
}

impl ContainerSpec {
    /// Map host paths in `value` into the container.
    ///
    /// Each space-separated word is rewritten only when it begins with the
    /// host root, or carries it right after a flag (`-I<path>`, `--dir=<path>`).
    pub fn rewrite(&self, value: &str) -> String {
        let root = self.host_root.to_string_lossy();
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            return value.to_string();
        }
        value
            .split(' ')
            .map(|word| {
                self.rewrite_word(word, root)
                    .unwrap_or_else(|| word.to_string())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn rewrite_word(&self, word: &str, root: &str) -> Option<String> {
        let path_start = if !word.starts_with('-') {
            0
        } else if let Some(eq) = word.find('=') {
            eq + 1
        } else {
            word.char_indices().nth(2).map(|(index, _)| index)?
        };
        let (flag, path) = word.split_at(path_start);
        let rest = path.strip_prefix(root)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(format!("{}{}{}", flag, self.mount, rest))
        } else {
            None
        }
    }

    /// Full host-side invocation running `argv` inside the image.
    pub fn wrap(
        &self,
        argv: &[String],
        cwd: &Path,
        extra_env: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut wrapped = vec![
            self.runtime.clone(),
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}", self.host_root.display(), self.mount),
            "-w".to_string(),
            self.rewrite(&cwd.to_string_lossy()),
        ];
        for (key, value) in extra_env {
            wrapped.push("-e".to_string());
            wrapped.push(format!("{}={}", key, self.rewrite(value)));
        }
        wrapped.push(self.image.clone());
        wrapped.extend(argv.iter().map(|arg| self.rewrite(arg)));
        wrapped
    }
}

/// Production dispatcher: spawns host processes, wrapping Container commands.
#[derive(Debug, Clone)]
pub struct ProcessDispatcher {
    container: ContainerSpec,
}

impl ProcessDispatcher {
    pub fn new(container: ContainerSpec) -> Self {
        ProcessDispatcher { container }
    }

    pub fn container(&self) -> &ContainerSpec {
        &self.container
    }

    /// The argv actually spawned on the host for `environment`.
    pub fn host_invocation(
        &self,
        environment: ExecutionEnvironment,
        argv: &[String],
        cwd: &Path,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, DispatchError> {
        if argv.is_empty() {
            return Err(DispatchError::EmptyCommand);
        }
        match environment {
            ExecutionEnvironment::Local => Ok(argv.to_vec()),
            ExecutionEnvironment::Container => Ok(self.container.wrap(argv, cwd, extra_env)),
            ExecutionEnvironment::Device => Err(DispatchError::DeviceRequiresBridge),
        }
    }

    async fn spawn(
        &self,
        environment: ExecutionEnvironment,
        argv: &[String],
        cwd: &Path,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<ExitOutcome, DispatchError> {
        let invocation = self.host_invocation(environment, argv, cwd, extra_env)?;
        let program = invocation[0].clone();

        log::debug!(
            "[Dispatch] [{}] {} (cwd: {})",
            environment,
            invocation.join(" "),
            cwd.display()
        );

        let mut command = Command::new(&program);
        command.args(&invocation[1..]);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        // Container commands get their env through `-e`, with rewritten paths
        if environment == ExecutionEnvironment::Local {
            command.current_dir(cwd);
            command.envs(extra_env);
        }

        let mut child = command.spawn().map_err(|source| DispatchError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (out_lines, err_lines) = tokio::join!(
            collect_lines(stdout, &program),
            collect_lines(stderr, &program)
        );

        let status = child.wait().await.map_err(|source| DispatchError::Output {
            program: program.clone(),
            source,
        })?;

        let mut captured = out_lines.map_err(|source| DispatchError::Output {
            program: program.clone(),
            source,
        })?;
        captured.extend(err_lines.map_err(|source| DispatchError::Output {
            program: program.clone(),
            source,
        })?);

        log::debug!("[Dispatch] {} exited with {:?}", program, status.code());

        Ok(ExitOutcome {
            code: status.code(),
            captured_output: captured.join("\n"),
        })
    }
}

impl CommandDispatcher for ProcessDispatcher {
    fn run<'a>(
        &'a self,
        environment: ExecutionEnvironment,
        argv: &'a [String],
        cwd: &'a Path,
        extra_env: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<ExitOutcome, DispatchError>> {
        self.spawn(environment, argv, cwd, extra_env).boxed()
    }
}

/// Read a child stream to the end, echoing each line to the debug log.
async fn collect_lines<R>(stream: Option<R>, program: &str) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    if let Some(stream) = stream {
        let mut reader = BufReader::new(stream).lines();
        while let Some(line) = reader.next_line().await? {
            log::debug!("[Dispatch] [{}] {}", program, line);
            lines.push(line);
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            runtime: "docker".to_string(),
            image: "dockcross/linux-x86".to_string(),
            host_root: PathBuf::from("/home/dev/ws"),
            mount: "/work".to_string(),
        }
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rewrite_only_touches_host_root() {
        let spec = spec();
        assert_eq!(spec.rewrite("/home/dev/ws"), "/work");
        assert_eq!(spec.rewrite("/home/dev/ws/numpy"), "/work/numpy");
        assert_eq!(
            spec.rewrite("-I/home/dev/ws/termux/x86/files/usr/include"),
            "-I/work/termux/x86/files/usr/include"
        );
        assert_eq!(spec.rewrite("/home/dev/wsx/numpy"), "/home/dev/wsx/numpy");
        assert_eq!(spec.rewrite("/usr/include"), "/usr/include");
    }

    #[test]
    fn test_rewrite_is_anchored_to_word_start() {
        let spec = spec();
        // Host root nested inside another path stays untouched
        assert_eq!(spec.rewrite("/mnt/home/dev/ws/x"), "/mnt/home/dev/ws/x");
        assert_eq!(
            spec.rewrite("-I/mnt/home/dev/ws/include"),
            "-I/mnt/home/dev/ws/include"
        );
        assert_eq!(
            spec.rewrite("--install-dir=/home/dev/ws/toolchain-26-arm"),
            "--install-dir=/work/toolchain-26-arm"
        );
        assert_eq!(
            spec.rewrite("/home/dev/ws/termux/lib/libpython2.7.so -shared"),
            "/work/termux/lib/libpython2.7.so -shared"
        );
        assert_eq!(
            spec.rewrite("-L/home/dev/ws/lib -I/home/dev/ws/include /opt/home/dev/ws"),
            "-L/work/lib -I/work/include /opt/home/dev/ws"
        );
        assert_eq!(spec.rewrite("-"), "-");
        assert_eq!(spec.rewrite(""), "");
    }

    #[test]
    fn test_local_invocation_is_unmodified() {
        let dispatcher = ProcessDispatcher::new(spec());
        let cmd = argv(&["git", "clone", "https://example.com/repo.git"]);
        let invocation = dispatcher
            .host_invocation(
                ExecutionEnvironment::Local,
                &cmd,
                Path::new("/home/dev/ws"),
                &BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(invocation, cmd);
    }

    #[test]
    fn test_container_invocation_wraps_and_mounts() {
        let dispatcher = ProcessDispatcher::new(spec());
        let mut env = BTreeMap::new();
        env.insert("CC".to_string(), "/home/dev/ws/toolchain/bin/clang".to_string());
        let cmd = argv(&["python", "setup.py", "bdist_egg"]);

        let invocation = dispatcher
            .host_invocation(
                ExecutionEnvironment::Container,
                &cmd,
                Path::new("/home/dev/ws/numpy"),
                &env,
            )
            .unwrap();

        assert_eq!(
            invocation,
            argv(&[
                "docker",
                "run",
                "--rm",
                "-v",
                "/home/dev/ws:/work",
                "-w",
                "/work/numpy",
                "-e",
                "CC=/work/toolchain/bin/clang",
                "dockcross/linux-x86",
                "python",
                "setup.py",
                "bdist_egg",
            ])
        );
    }

    #[test]
    fn test_device_and_empty_are_rejected() {
        let dispatcher = ProcessDispatcher::new(spec());
        let cwd = Path::new("/tmp");
        assert!(matches!(
            dispatcher.host_invocation(
                ExecutionEnvironment::Device,
                &argv(&["ls"]),
                cwd,
                &BTreeMap::new()
            ),
            Err(DispatchError::DeviceRequiresBridge)
        ));
        assert!(matches!(
            dispatcher.host_invocation(ExecutionEnvironment::Local, &[], cwd, &BTreeMap::new()),
            Err(DispatchError::EmptyCommand)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_run_captures_output_and_code() {
        let dispatcher = ProcessDispatcher::new(spec());
        let tmp = tempfile::TempDir::new().unwrap();
        let mut env = BTreeMap::new();
        env.insert("CVFORGE_GREETING".to_string(), "hello-from-env".to_string());
        let cmd = argv(&["sh", "-c", "echo $CVFORGE_GREETING; pwd; exit 3"]);

        let outcome = dispatcher
            .run(ExecutionEnvironment::Local, &cmd, tmp.path(), &env)
            .await
            .unwrap();

        assert_eq!(outcome.code, Some(3));
        assert!(!outcome.success());
        assert!(outcome.captured_output.contains("hello-from-env"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let dispatcher = ProcessDispatcher::new(spec());
        let cmd = argv(&["cvforge-definitely-not-a-binary"]);
        let result = dispatcher
            .run(
                ExecutionEnvironment::Local,
                &cmd,
                Path::new("."),
                &BTreeMap::new(),
            )
            .await;
        assert!(matches!(result, Err(DispatchError::Spawn { .. })));
    }
}
