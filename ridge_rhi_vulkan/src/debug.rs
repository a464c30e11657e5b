/// Vulkan debug messenger: validation layer messages with colored output
///
/// Each rendering context owns a [`DebugReporter`]. Its address is the
/// messenger's user data, so the callback reads the reporting options of its
/// own context and counts into that context's statistics.

use ash::vk;
use colored::*;
use ridge_rhi::ridge::rhi::{Config, DebugOutput, DebugSeverity, ValidationStats};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::vulkan_context::lock;

#[derive(Default)]
struct SeverityCounters {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl SeverityCounters {
    fn count(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
        let counter = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            &self.errors
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            &self.warnings
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            &self.info
        } else {
            &self.verbose
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }
}

/// Reporting options and statistics of one rendering context
pub(crate) struct DebugReporter {
    config: Config,
    counters: SeverityCounters,
    /// Occurrences of each message text, for the `[×n]` repeat marker
    occurrences: Mutex<FxHashMap<String, u32>>,
}

impl DebugReporter {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            counters: SeverityCounters::default(),
            occurrences: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn stats(&self) -> ValidationStats {
        self.counters.snapshot()
    }

    /// Number of distinct messages reported more than once
    pub fn repeated_message_count(&self) -> usize {
        lock(&self.occurrences).values().filter(|&&count| count > 1).count()
    }

    /// Whether a message passes the severity threshold and the category filter
    fn accepts(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    ) -> bool {
        let filter = self.config.debug_message_filter;
        let category_shown = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
            filter.show_validation
        } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
            filter.show_performance
        } else {
            filter.show_general
        };
        category_shown && severity_enabled(self.config.debug_severity, severity)
    }

    /// Count the message and return how many times its text was seen
    fn record(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) -> u32 {
        if !self.config.enable_validation_stats {
            return 1;
        }
        self.counters.count(severity);
        let mut occurrences = lock(&self.occurrences);
        let count = occurrences.entry(message.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn report(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT,
        message_id: &str,
        message: &str,
    ) {
        if !self.accepts(severity, message_type) {
            return;
        }

        let is_error = severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
        let label = severity_label(severity);
        let label_colored = match label {
            "ERROR" => label.red().bold(),
            "WARNING" => label.yellow().bold(),
            "INFO" => label.cyan(),
            _ => label.bright_black(),
        };
        let type_name = message_type_name(message_type);

        let occurrences = self.record(severity, message);
        let repeat = if occurrences > 1 {
            format!(" [×{}]", occurrences)
        } else {
            String::new()
        };

        let console_text = format!(
            "{} {} [{}]{}\n  ├─ {}: {}\n  └─ {}\n",
            "[VULKAN".bright_blue().bold(),
            format!("{}]", label_colored).bright_blue().bold(),
            type_name.bright_black(),
            repeat.yellow(),
            "Message ID".bright_black(),
            message_id.white(),
            message.white()
        );
        let plain_text = format!(
            "[VULKAN {}] [{}]{}\n  ├─ Message ID: {}\n  └─ {}\n",
            label, type_name, repeat, message_id, message
        );
        match &self.config.debug_output {
            DebugOutput::Console => eprint!("{}", console_text),
            DebugOutput::File(path) => append_to_file(path, &plain_text),
            DebugOutput::Both(path) => {
                eprint!("{}", console_text);
                append_to_file(path, &plain_text);
            }
        }

        if !is_error {
            return;
        }
        if self.config.panic_on_error {
            panic!(
                "Vulkan validation error (panic_on_error)\n  Message ID: {}\n  Type: {}\n  Message: {}",
                message_id, type_name, message
            );
        }
        if self.config.break_on_validation_error {
            eprintln!(
                "\n{}\n  {} [{}]\n  {}\n",
                "Validation error with break_on_validation_error set, aborting".red().bold(),
                message_id.yellow(),
                type_name.cyan(),
                message.white()
            );
            std::process::abort();
        }
    }

    /// Print the statistics of this context to stdout
    pub fn print_report(&self) {
        let stats = self.stats();
        if stats.total() == 0 {
            println!("\n{}", "No validation messages".green().bold());
            return;
        }

        println!("\n{}", "--- Vulkan validation messages ---".bright_blue().bold());
        let rows = [
            ("Errors:".red().bold(), stats.errors),
            ("Warnings:".yellow().bold(), stats.warnings),
            ("Info:".cyan(), stats.info),
            ("Verbose:".bright_black(), stats.verbose),
        ];
        for (label, count) in rows.into_iter().filter(|(_, count)| *count > 0) {
            println!("  {} {}", label, count);
        }
        println!("  {} {}", "Total:".white().bold(), stats.total());

        let repeated = self.repeated_message_count();
        if repeated > 0 {
            println!("  {} distinct message(s) repeated", repeated);
        }
        println!();
    }
}

/// Whether a message of `severity` passes the configured threshold
pub(crate) fn severity_enabled(threshold: DebugSeverity, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> bool {
    match threshold {
        DebugSeverity::ErrorsOnly => severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
        DebugSeverity::ErrorsAndWarnings => severity.intersects(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        ),
        DebugSeverity::All => true,
    }
}

/// Severities to request from the messenger for `threshold`
pub(crate) fn messenger_severities(threshold: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let errors = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    match threshold {
        DebugSeverity::ErrorsOnly => errors,
        DebugSeverity::ErrorsAndWarnings => errors | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        DebugSeverity::All => {
            errors
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

fn severity_label(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> &'static str {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        "ERROR"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        "WARNING"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        "INFO"
    } else {
        "VERBOSE"
    }
}

fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// `text` as UTF-8, or `fallback` when the pointer is null
unsafe fn c_text<'a>(text: *const std::os::raw::c_char, fallback: &'a str) -> &'a str {
    if text.is_null() {
        fallback
    } else {
        CStr::from_ptr(text).to_str().unwrap_or("<invalid UTF-8>")
    }
}

/// Vulkan debug messenger callback
///
/// # Safety
///
/// `user_data` must point to the [`DebugReporter`] the messenger was created
/// with, alive until the messenger is destroyed.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }
    let reporter = &*(user_data as *const DebugReporter);
    let callback_data = &*p_callback_data;
    let message_id = c_text(callback_data.p_message_id_name, "Unknown");
    let message = c_text(callback_data.p_message, "No message");
    reporter.report(message_severity, message_type, message_id, message);
    vk::FALSE
}

fn append_to_file(path: &str, text: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", text);
    }
}
