//! Logging for the Ridge RHI
//!
//! The core and every backend report through one process-wide logger:
//! - Customizable via the [`Logger`] trait (see `Ridge::set_logger`)
//! - Severity levels (Trace, Debug, Info, Warn, Error)
//! - Colored console output by default, filtered by a minimum severity
//! - ERROR entries carry the `file:line` where they were raised
//!
//! Besides the plain `ridge_*!` logging macros, `ridge_err!`, `ridge_bail!`
//! and `ridge_ensure!` log an error and build the matching [`crate::ridge::Error`]
//! in one step. This is how every validation failure is raised.

use colored::*;
use std::fmt;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Destination for log entries
///
/// # Example
///
/// ```no_run
/// use ridge_rhi::ridge::log::{Logger, LogEntry};
///
/// struct FileLogger {
///     file: std::sync::Mutex<std::fs::File>,
/// }
///
/// impl Logger for FileLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Write to file...
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// One log message with its metadata
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,

    pub timestamp: SystemTime,

    /// Emitting module (e.g. "ridge::rhi::CommandBuffer", "ridge::vulkan")
    pub source: String,

    pub message: String,

    /// Source file (only for ERROR entries)
    pub file: Option<&'static str>,

    /// Source line (only for ERROR entries)
    pub line: Option<u32>,
}

/// Log severity levels, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogSeverity {
    /// Fixed-width label used by [`DefaultLogger`]
    pub fn label(self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label().trim_end())
    }
}

/// Colored console logger
///
/// Entries below `min_severity` are dropped. Warnings and errors go to
/// stderr, everything else to stdout.
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Error: `[timestamp] [ERROR] [source] message (file:line)`
pub struct DefaultLogger {
    pub min_severity: LogSeverity,
}

impl DefaultLogger {
    pub fn new(min_severity: LogSeverity) -> Self {
        Self { min_severity }
    }

    /// Plain (uncolored) rendering of an entry
    pub fn format_entry(entry: &LogEntry) -> String {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f");
        match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, entry.severity.label(), entry.source, entry.message, file, line
            ),
            _ => format!(
                "[{}] [{}] [{}] {}",
                timestamp, entry.severity.label(), entry.source, entry.message
            ),
        }
    }
}

impl Default for DefaultLogger {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::new(LogSeverity::Debug)
        } else {
            Self::new(LogSeverity::Info)
        }
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        if entry.severity < self.min_severity {
            return;
        }

        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let label = entry.severity.label();
        let severity_str = match entry.severity {
            LogSeverity::Trace => label.bright_black(),
            LogSeverity::Debug => label.cyan(),
            LogSeverity::Info => label.green(),
            LogSeverity::Warn => label.yellow(),
            LogSeverity::Error => label.red().bold(),
        };
        let source = entry.source.bright_blue();

        let line = match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity_str, source, entry.message, file, line
            ),
            _ => format!("[{}] [{}] [{}] {}", timestamp, severity_str, source, entry.message),
        };

        if entry.severity >= LogSeverity::Warn {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message
#[macro_export]
macro_rules! ridge_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::ridge::Ridge::log(
            $crate::ridge::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
///
/// # Example
///
/// ```no_run
/// ridge_rhi::ridge_debug!("ridge::vulkan", "Created {} descriptor bindings", 5);
/// ```
#[macro_export]
macro_rules! ridge_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::ridge::Ridge::log(
            $crate::ridge::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message
#[macro_export]
macro_rules! ridge_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::ridge::Ridge::log(
            $crate::ridge::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! ridge_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::ridge::Ridge::log(
            $crate::ridge::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! ridge_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::ridge::Ridge::log_detailed(
            $crate::ridge::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR and evaluate to `Error::$kind(message)`
///
/// # Example
///
/// ```no_run
/// use ridge_rhi::ridge::Error;
///
/// let err: Error = ridge_rhi::ridge_err!("ridge::rhi::Buffer", InvalidValue, "Size must be non-zero");
/// ```
#[macro_export]
macro_rules! ridge_err {
    ($source:expr, $kind:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::ridge::Ridge::log_detailed(
            $crate::ridge::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::ridge::Error::$kind(message)
    }};
}

/// Log an ERROR and return `Err(Error::$kind(message))` from the enclosing function
#[macro_export]
macro_rules! ridge_bail {
    ($source:expr, $kind:ident, $($arg:tt)*) => {
        return ::std::result::Result::Err($crate::ridge_err!($source, $kind, $($arg)*))
    };
}

/// `ridge_bail!` unless `$cond` holds
#[macro_export]
macro_rules! ridge_ensure {
    ($cond:expr, $source:expr, $kind:ident, $($arg:tt)*) => {
        if !($cond) {
            $crate::ridge_bail!($source, $kind, $($arg)*);
        }
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
