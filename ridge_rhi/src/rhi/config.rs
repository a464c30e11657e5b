/// Rendering context configuration and validation-layer reporting options

/// Minimum severity of backend validation messages that get reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    ErrorsOnly,
    #[default]
    ErrorsAndWarnings,
    All,
}

/// Where backend validation messages are written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DebugOutput {
    #[default]
    Console,
    /// Append to the file at the given path
    File(String),
    /// Console and file
    Both(String),
}

/// Categories of backend validation messages to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: false,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Counters of validation messages received since the context was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Configuration handed to a rendering context at creation
#[derive(Debug, Clone)]
pub struct Config {
    pub application_name: String,

    /// (major, minor, patch)
    pub application_version: (u32, u32, u32),

    /// Turn on the backend validation layer (Vulkan validation layers, Metal API validation)
    pub enable_validation: bool,

    pub debug_severity: DebugSeverity,

    pub debug_output: DebugOutput,

    pub debug_message_filter: DebugMessageFilter,

    /// Abort the process on the first validation error
    pub break_on_validation_error: bool,

    /// Panic instead of aborting, so tests can observe the failure
    pub panic_on_error: bool,

    pub enable_validation_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_name: "Ridge Application".to_string(),
            application_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::default(),
            debug_output: DebugOutput::default(),
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: true,
            panic_on_error: false,
            enable_validation_stats: false,
        }
    }
}
