//! Leveled logging capability injected into the fetch engine.
//!
//! The retry loop reports every attempt, delay and cause through a
//! [`LeveledLogger`] rather than calling `tracing` directly, so hosts can
//! route engine messages wherever they like. [`TracingLogger`] is the default.

use std::fmt::{self, Display, Write as _};
use std::sync::{Arc, Mutex};

/// Key/value pairs attached to a log message.
pub type Fields<'a> = &'a [(&'a str, &'a dyn Display)];

/// Minimal leveled logger: a message plus structured fields.
pub trait LeveledLogger: Send + Sync {
    fn error(&self, msg: &str, fields: Fields<'_>);
    fn warn(&self, msg: &str, fields: Fields<'_>);
    fn info(&self, msg: &str, fields: Fields<'_>);
    fn debug(&self, msg: &str, fields: Fields<'_>);
}

/// Shared handle to a logger.
pub type SharedLogger = Arc<dyn LeveledLogger>;

/// Render fields as space separated `key=value` pairs.
#[must_use]
pub fn render_fields(fields: Fields<'_>) -> String {
    let mut out = String::new();
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        // Writing into a String cannot fail.
        let _ = write!(out, "{key}={value}");
    }
    out
}

/// Forwards to `tracing` under the `utilities_http::retry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl LeveledLogger for TracingLogger {
    fn error(&self, msg: &str, fields: Fields<'_>) {
        tracing::error!(target: "utilities_http::retry", fields = %render_fields(fields), "{msg}");
    }

    fn warn(&self, msg: &str, fields: Fields<'_>) {
        tracing::warn!(target: "utilities_http::retry", fields = %render_fields(fields), "{msg}");
    }

    fn info(&self, msg: &str, fields: Fields<'_>) {
        tracing::info!(target: "utilities_http::retry", fields = %render_fields(fields), "{msg}");
    }

    fn debug(&self, msg: &str, fields: Fields<'_>) {
        tracing::debug!(target: "utilities_http::retry", fields = %render_fields(fields), "{msg}");
    }
}

/// Log level of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        })
    }
}

/// A message captured by [`MemoryLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    /// Value of the named field, if present.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every record in memory. Useful to assert on retry behaviour.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records logged so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn push(&self, level: Level, msg: &str, fields: Fields<'_>) {
        let record = LogRecord {
            level,
            message: msg.to_owned(),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.to_string()))
                .collect(),
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

impl LeveledLogger for MemoryLogger {
    fn error(&self, msg: &str, fields: Fields<'_>) {
        self.push(Level::Error, msg, fields);
    }

    fn warn(&self, msg: &str, fields: Fields<'_>) {
        self.push(Level::Warn, msg, fields);
    }

    fn info(&self, msg: &str, fields: Fields<'_>) {
        self.push(Level::Info, msg, fields);
    }

    fn debug(&self, msg: &str, fields: Fields<'_>) {
        self.push(Level::Debug, msg, fields);
    }
}
