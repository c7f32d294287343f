//! Tracing subscriber setup.
//!
//! Installs a `tracing-subscriber` fmt layer writing to stderr, filtered at
//! the configured [`LogLevel`] unless `RUST_LOG` says otherwise, with
//! timestamps rendered per [`TimestampFormat`].

use std::time::Instant;

use chrono::{Local, SecondsFormat};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

use crate::config::{LogLevel, TimestampFormat};
use crate::error::{Result, RoodaError};

/// Renders log timestamps in one of the configured layouts.
#[derive(Debug, Clone, Copy)]
pub struct LogClock {
    format: TimestampFormat,
    start: Instant,
}

impl LogClock {
    /// A clock whose `relative` timestamps count from now.
    #[must_use]
    pub fn new(format: TimestampFormat) -> Self {
        Self {
            format,
            start: Instant::now(),
        }
    }

    /// The timestamp text for the current instant; empty for `none`.
    #[must_use]
    pub fn render(&self) -> String {
        match self.format {
            TimestampFormat::Time | TimestampFormat::TimeMs => {
                format!("[{}]", Local::now().format("%H:%M:%S%.3f"))
            }
            TimestampFormat::Relative => {
                format!("[+{:.3}s]", self.start.elapsed().as_secs_f64())
            }
            TimestampFormat::Iso => Local::now().to_rfc3339_opts(SecondsFormat::Nanos, false),
            TimestampFormat::None => String::new(),
        }
    }
}

impl FormatTime for LogClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        w.write_str(&self.render())
    }
}

/// Build the event filter: `RUST_LOG` when set and valid, else `level`.
#[must_use]
pub fn env_filter(level: LogLevel, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init(level: LogLevel, format: TimestampFormat) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level, rust_log.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        TimestampFormat::None => builder.without_time().try_init(),
        other => builder.with_timer(LogClock::new(other)).try_init(),
    };
    installed.map_err(|e| RoodaError::Other(anyhow::anyhow!("failed to initialise logging: {}", e)))
}
