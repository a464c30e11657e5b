//! Integration tests for the process logger
//!
//! The logger is global, so every test runs serially.
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use ridge_rhi::ridge::log::{LogEntry, LogSeverity, Logger};
use ridge_rhi::ridge::rhi::{BufferDesc, BufferMemoryLocation, BufferUsage, DeviceLimits, ImageDesc};
use ridge_rhi::ridge::{Error, Ridge};
use ridge_rhi::{ridge_bail, ridge_debug, ridge_ensure, ridge_error, ridge_info};
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Captures entries for inspection
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn install() -> Arc<Mutex<Vec<LogEntry>>> {
        let entries = Arc::new(Mutex::new(Vec::new()));
        Ridge::set_logger(Self { entries: Arc::clone(&entries) });
        entries
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGER TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let entries = TestLogger::install();

    Ridge::log(LogSeverity::Info, "test::module", "Info message".to_string());
    Ridge::log(LogSeverity::Warn, "test::module", "Warning message".to_string());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].severity, LogSeverity::Info);
        assert_eq!(captured[0].source, "test::module");
        assert_eq!(captured[0].message, "Info message");
        assert_eq!(captured[1].severity, LogSeverity::Warn);
        assert_eq!(captured[1].file, None);
    }

    Ridge::reset_logger();
}

#[test]
#[serial]
fn test_integration_logger_reset() {
    let entries = TestLogger::install();
    Ridge::log(LogSeverity::Info, "test", "Captured".to_string());
    Ridge::reset_logger();
    Ridge::log(LogSeverity::Info, "test", "Goes to the console".to_string());

    assert_eq!(entries.lock().unwrap().len(), 1);
}

#[test]
#[serial]
fn test_integration_macros() {
    let entries = TestLogger::install();

    ridge_debug!("test::macros", "value is {}", 7);
    ridge_info!("test::macros", "plain");
    ridge_error!("test::macros", "failure {}", "here");

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[0].severity, LogSeverity::Debug);
        assert_eq!(captured[0].message, "value is 7");
        assert_eq!(captured[2].severity, LogSeverity::Error);
        assert_eq!(captured[2].message, "failure here");
        assert_eq!(captured[2].file, Some(file!()));
        assert!(captured[2].line.is_some());
    }

    Ridge::reset_logger();
}

// ============================================================================
// ERROR REPORTING
// ============================================================================

fn check_positive(value: i32) -> ridge_rhi::ridge::Result<i32> {
    ridge_ensure!(value > 0, "test::errors", InvalidValue, "{} is not positive", value);
    Ok(value)
}

fn always_fails() -> ridge_rhi::ridge::Result<()> {
    ridge_bail!("test::errors", UnsupportedFeature, "Feature {} is missing", "x");
}

#[test]
#[serial]
fn test_integration_error_macros_log_and_build() {
    let entries = TestLogger::install();

    assert_eq!(check_positive(3), Ok(3));
    assert_eq!(check_positive(-1), Err(Error::InvalidValue("-1 is not positive".to_string())));
    assert!(matches!(always_fails(), Err(Error::UnsupportedFeature(_))));

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert!(captured.iter().all(|entry| entry.severity == LogSeverity::Error));
        assert_eq!(captured[0].source, "test::errors");
        assert_eq!(captured[0].message, "-1 is not positive");
        assert_eq!(captured[1].message, "Feature x is missing");
        assert!(captured.iter().all(|entry| entry.file.is_some() && entry.line.is_some()));
    }

    Ridge::reset_logger();
}

#[test]
#[serial]
fn test_integration_validation_failures_are_logged() {
    let entries = TestLogger::install();

    let buffer = BufferDesc {
        name: "both",
        memory_size: 64,
        usage: BufferUsage::UNIFORM | BufferUsage::STORAGE,
        memory_location: BufferMemoryLocation::Cpu,
    };
    assert!(matches!(buffer.validate(&DeviceLimits::default()), Err(Error::InvalidConfiguration(_))));

    let image = ImageDesc { name: "empty", ..Default::default() };
    assert!(image.validate().is_err());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].source, "ridge::rhi::Buffer");
        assert!(captured[0].message.contains("'both'"));
        assert_eq!(captured[1].source, "ridge::rhi::Image");
    }

    Ridge::reset_logger();
}
