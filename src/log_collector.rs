//! Decoupled logging pipeline for pipeline runs.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / log::debug!() ...
//!     |
//! [LogCollector] (Log impl, non-blocking)
//!     |                         \
//!     | crossbeam channel        stderr echo (records at or above console level)
//!     v
//! [DiskPersister thread]
//!     |
//! logs/full/<ts>_full.log      every record
//! logs/parsed/<ts>_parsed.log  records with target "parsed" (stage transitions)
//! ```
//!
//! Each collector owns one session: the two log files are created when the
//! collector starts and every line of the run goes to them.

use chrono::Local;
use crossbeam_channel::{bounded, unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Record target routed to the parsed log as well.
pub const PARSED_TARGET: &str = "parsed";

enum LogMessage {
    Line(LogLine),
    /// Flush marker; the sender is signalled once everything before it is on disk.
    Flush(Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    /// Also written to the parsed log.
    pub parsed: bool,
    /// `HH:MM:SS.mmm` at creation.
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            parsed: true,
            ..LogLine::new(message)
        }
    }

    fn formatted(&self) -> String {
        format!("[{}] {}\n", self.timestamp, self.message)
    }
}

/// Logs directory for a working directory: `<workdir>/logs`.
pub fn logs_dir_for(workdir: &Path) -> PathBuf {
    workdir.join("logs")
}

/// Session files of one collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLogs {
    pub full: PathBuf,
    pub parsed: PathBuf,
}

/// Unified logger: disk persistence plus console echo.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    session: SessionLogs,
    console_level: LevelFilter,
    file_level: LevelFilter,
}

impl LogCollector {
    /// Create the session files under `log_dir` and start the disk persister.
    pub fn new(log_dir: PathBuf, console_level: LevelFilter) -> Result<Self, String> {
        let full_dir = log_dir.join("full");
        let parsed_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let session = SessionLogs {
            full: full_dir.join(format!("{}_full.log", stamp)),
            parsed: parsed_dir.join(format!("{}_parsed.log", stamp)),
        };
        let mut full = open_append(&session.full)?;
        let mut parsed = open_append(&session.parsed)?;

        // OS thread, not a tokio task: logging must work from any runtime
        // and keep draining while the orchestrator blocks on a gate.
        let (tx, rx) = unbounded::<LogMessage>();
        std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let formatted = line.formatted();
                        let _ = full.write_all(formatted.as_bytes());
                        if line.parsed {
                            let _ = parsed.write_all(formatted.as_bytes());
                        }
                    }
                    LogMessage::Flush(done) => {
                        let _ = full.flush();
                        let _ = parsed.flush();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx,
            session,
            console_level,
            file_level: LevelFilter::Debug,
        })
    }

    /// Register as the global `log` backend.
    pub fn install(&self) -> Result<(), log::SetLoggerError> {
        let max_level = self.console_level.max(self.file_level);
        log::set_boxed_logger(Box::new(self.clone())).map(|()| log::set_max_level(max_level))
    }

    pub fn session(&self) -> &SessionLogs {
        &self.session
    }

    /// Send a log line (non-blocking, never fails).
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(message.into()));
    }

    /// High-level status line, also written to the parsed log.
    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(message.into()));
    }

    /// Block until every line sent before this call is written to disk.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (done_tx, done_rx) = bounded::<()>(1);
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        done_rx
            .recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.file_level || metadata.level() <= self.console_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if record.level() <= self.console_level {
            match record.level() {
                Level::Error | Level::Warn => eprintln!("{}: {}", record.level(), record.args()),
                _ => eprintln!("{}", record.args()),
            }
        }

        if record.level() <= self.file_level {
            let message = format!("[{}] {}", record.level(), record.args());
            if record.target() == PARSED_TARGET {
                self.log_parsed(message);
            } else {
                self.log_str(message);
            }
        }
    }

    fn flush(&self) {}
}
