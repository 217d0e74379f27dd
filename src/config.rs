//! Configuration for tracing behavior.

use std::time::Duration;

/// Configuration options for database tracing.
///
/// Set once when a driver is wrapped and shared by every connection,
/// statement and cursor derived from it. There is no per-call override.
///
/// # Example
///
/// ```rust
/// use sqltrace::TracingConfig;
/// use std::time::Duration;
///
/// let config = TracingConfig::default()
///     .with_query(true)
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to record the SQL text as `sql.statement`.
    /// Default: `false` (queries may embed literals with sensitive data)
    pub include_query: bool,

    /// Whether to record the bound arguments as `sql.args`.
    /// Default: `false` (parameters usually contain user input)
    pub include_args: bool,

    /// Whether to record the number of rows affected/returned.
    /// Default: `true`
    pub record_row_counts: bool,

    /// Spans lasting longer than this get `slow_query = true` and a WARN event.
    /// For queries the duration runs until the cursor is closed.
    /// Default: 500ms
    pub slow_query_threshold: Duration,

    /// Value of the `db.system` span field.
    /// Default: `"postgresql"`
    pub db_system: &'static str,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            include_query: false,
            include_args: false,
            record_row_counts: true,
            slow_query_threshold: Duration::from_millis(500),
            db_system: "postgresql",
        }
    }
}

impl TracingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable recording of the SQL text.
    ///
    /// **Security Warning**: Enabling this may expose sensitive data in your traces
    /// if your queries contain credentials or PII in the SQL text itself.
    pub fn with_query(mut self, enabled: bool) -> Self {
        self.include_query = enabled;
        self
    }

    /// Enable or disable recording of bound arguments.
    ///
    /// **Security Warning**: Query parameters often contain user input and
    /// potentially sensitive data. Only enable in development or controlled environments.
    pub fn with_args(mut self, enabled: bool) -> Self {
        self.include_args = enabled;
        self
    }

    /// Enable or disable row count recording.
    pub fn with_row_count_recording(mut self, enabled: bool) -> Self {
        self.record_row_counts = enabled;
        self
    }

    /// Set the threshold for slow query warnings.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Set the `db.system` reported on spans (e.g. `"mysql"`).
    pub fn with_db_system(mut self, system: &'static str) -> Self {
        self.db_system = system;
        self
    }

    /// Create a development-friendly configuration with full logging enabled.
    ///
    /// **Warning**: Do not use in production as it records all SQL and arguments.
    pub fn development() -> Self {
        Self {
            include_query: true,
            include_args: true,
            slow_query_threshold: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Create a production-safe configuration with minimal overhead.
    pub fn production() -> Self {
        Self {
            include_query: false,
            include_args: false,
            slow_query_threshold: Duration::from_secs(1),
            ..Self::default()
        }
    }
}
