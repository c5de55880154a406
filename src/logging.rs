//! Logging setup and instrumentation helpers
//!
//! - `LogConfig` presets and `init_logging` for the tracing subscriber
//! - `CorrelationId` tagging every gossip round
//! - `PerformanceTimer` measuring round fan-out

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    Layer, Registry,
};
use uuid::Uuid;

/// Identifier shared by all log lines of one gossip round
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, enough to tell rounds apart in a log
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timing of one instrumented operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Operation name
    pub operation: String,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Additional contextual data
    pub metadata: HashMap<String, String>,
}

/// Subscriber configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level filter
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// ANSI colors in human-readable output
    pub colors: bool,
    /// Include file and line numbers
    pub include_location: bool,
    /// Include thread names
    pub include_thread: bool,
    /// Log span open/close
    pub include_spans: bool,
    /// Per-target level overrides
    pub targets: HashMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            colors: true,
            include_location: false,
            include_thread: false,
            include_spans: false,
            targets: HashMap::new(),
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// Build the level filter. `RUST_LOG`, when set, wins over `level`.
    pub fn env_filter(&self) -> Result<EnvFilter, Box<dyn std::error::Error + Send + Sync>> {
        let mut filter =
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&self.level))?;

        for (target, level) in &self.targets {
            filter = filter.add_directive(format!("{}={}", target, level).parse()?);
        }

        Ok(filter)
    }
}

/// Install the global tracing subscriber described by `config`
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = config.env_filter()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_thread_names(config.include_thread)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(if config.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let subscriber = Registry::default().with(env_filter).with(if config.json {
        fmt_layer.json().boxed()
    } else if config.colors {
        fmt_layer.boxed()
    } else {
        fmt_layer.with_ansi(false).boxed()
    });

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// JSON output, info level, round timings kept
pub fn production_config() -> LogConfig {
    LogConfig {
        level: "info".to_string(),
        json: true,
        colors: false,
        include_location: false,
        include_thread: true,
        include_spans: false,
        targets: [
            ("gossipdns".to_string(), "info".to_string()),
            ("gossipdns::performance".to_string(), "info".to_string()),
        ]
        .into_iter()
        .collect(),
    }
}

/// Human-readable output with per-message detail
pub fn development_config() -> LogConfig {
    LogConfig {
        level: "debug".to_string(),
        json: false,
        colors: true,
        include_location: true,
        include_thread: true,
        include_spans: true,
        targets: [
            ("gossipdns".to_string(), "debug".to_string()),
            ("tokio".to_string(), "info".to_string()),
        ]
        .into_iter()
        .collect(),
    }
}

/// Log a [`PerformanceMetrics`] under the `gossipdns::performance` target
#[macro_export]
macro_rules! performance_metric {
    ($metrics:expr, $correlation_id:expr) => {
        tracing::info!(
            target: "gossipdns::performance",
            correlation_id = %$correlation_id.short(),
            operation = %$metrics.operation,
            duration_ms = $metrics.duration_ms,
            metadata = ?$metrics.metadata,
            "Performance metric recorded"
        );
    };
    ($metrics:expr, $correlation_id:expr, $($fields:tt)*) => {
        tracing::info!(
            target: "gossipdns::performance",
            correlation_id = %$correlation_id.short(),
            operation = %$metrics.operation,
            duration_ms = $metrics.duration_ms,
            metadata = ?$metrics.metadata,
            $($fields)*,
            "Performance metric recorded"
        );
    };
}

/// Measures one operation from construction to [`finish`](Self::finish)
pub struct PerformanceTimer {
    operation: String,
    start: Instant,
    metadata: HashMap<String, String>,
}

impl PerformanceTimer {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn finish(self) -> PerformanceMetrics {
        PerformanceMetrics {
            operation: self.operation,
            duration_ms: self.start.elapsed().as_millis() as u64,
            metadata: self.metadata,
        }
    }
}
