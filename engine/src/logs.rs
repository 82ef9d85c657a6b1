//! Leveled progress logging for pipeline runs.
//!
//! The executor reports per-job progress through a small global logger so
//! that library users and the CLI share one output path. `set_quiet`
//! silences everything below `Error`.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log level for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level.
    pub level: LogLevel,
    /// Log message.
    pub message: String,
    /// Indentation level for nested progress lines.
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Global logger instance.
static LOGGER: Lazy<Logger> = Lazy::new(Logger::new);

/// Writes log entries to stderr, honoring the quiet flag.
pub struct Logger {
    quiet: AtomicBool,
}

impl Logger {
    fn new() -> Self {
        Self { quiet: AtomicBool::new(false) }
    }

    /// Emit a log entry.
    pub fn log(&self, entry: LogEntry) {
        if self.quiet.load(Ordering::Relaxed) && entry.level != LogLevel::Error {
            return;
        }
        let prefix = match entry.level {
            LogLevel::Info => "  ",
            LogLevel::Success => "✓ ",
            LogLevel::Warning => "! ",
            LogLevel::Error => "✗ ",
        };
        let indent = "  ".repeat(entry.indent as usize);
        eprintln!("{}{}{}", indent, prefix, entry.message);
    }
}

/// Suppress all output below `Error`.
pub fn set_quiet(quiet: bool) {
    LOGGER.quiet.store(quiet, Ordering::Relaxed);
}

/// Convenient logging functions
pub fn log_info(msg: impl Into<String>) {
    LOGGER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOGGER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOGGER.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOGGER.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOGGER.log(LogEntry::info(msg).with_indent(indent));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builders() {
        let entry = LogEntry::warning("slow table").with_indent(2);
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.indent, 2);
        assert_eq!(entry.message, "slow table");
    }
}
