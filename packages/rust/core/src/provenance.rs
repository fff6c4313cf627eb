//! Session provenance logging.
//!
//! Every session writes a per-document log (`{log_dir}/{normalized}.log`)
//! recording selections, composed queries, responses, token snapshots, and
//! failures. Each entry is mirrored to `tracing` so it also reaches the
//! process-wide subscriber.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bcorag_shared::{BcoRagError, Result, normalize_document_name};
use chrono::Utc;
use tracing::{error, info, warn};

/// Severity of a session log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Sink for session provenance entries.
pub trait SessionLog: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

fn emit_tracing(level: LogLevel, message: &str) {
    match level {
        LogLevel::Info => info!(target: "bcorag::session", "{message}"),
        LogLevel::Warn => warn!(target: "bcorag::session", "{message}"),
        LogLevel::Error => error!(target: "bcorag::session", "{message}"),
    }
}

/// Forwards entries to `tracing` only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl SessionLog for TracingLog {
    fn log(&self, level: LogLevel, message: &str) {
        emit_tracing(level, message);
    }
}

/// Appends entries to a per-document log file and mirrors them to `tracing`.
#[derive(Debug)]
pub struct DocumentLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl DocumentLog {
    /// Open (append) `{log_dir}/{normalized document name}.log`, creating
    /// `log_dir` if needed.
    pub fn open(log_dir: &Path, document_identity: &str) -> Result<Self> {
        let name = normalize_document_name(document_identity);
        if name.is_empty() {
            return Err(BcoRagError::config("document identity is empty"));
        }

        std::fs::create_dir_all(log_dir).map_err(|e| BcoRagError::io(log_dir, e))?;
        let path = log_dir.join(format!("{name}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| BcoRagError::io(&path, e))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionLog for DocumentLog {
    fn log(&self, level: LogLevel, message: &str) {
        emit_tracing(level, message);

        let line = format!("{} {:<5} {message}\n", Utc::now().to_rfc3339(), level.as_str());
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!(path = %self.path.display(), error = %e, "failed to write document log");
                }
            }
            Err(_) => warn!(path = %self.path.display(), "document log lock poisoned"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Collects entries in memory.
    #[derive(Debug, Default)]
    pub struct MemoryLog {
        entries: Mutex<Vec<(LogLevel, String)>>,
    }

    impl MemoryLog {
        pub fn entries(&self) -> Vec<(LogLevel, String)> {
            self.entries.lock().unwrap().clone()
        }

        pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
            self.entries()
                .iter()
                .any(|(l, m)| *l == level && m.contains(needle))
        }
    }

    impl SessionLog for MemoryLog {
        fn log(&self, level: LogLevel, message: &str) {
            self.entries.lock().unwrap().push((level, message.to_string()));
        }
    }
}
