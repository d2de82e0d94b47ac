//! Logging setup.
//!
//! - Console output with local timezone timestamps
//! - Optional daily rolling log files, written off-thread
//! - Log file retention cleanup (deletes logs older than 7 days)

use std::path::Path;

use chrono::{Local, Utc};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Rolling log file prefix; files are named `inbox-poller.log.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "inbox-poller.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Timer that formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    format!("inbox_poller={level},mail_transport={level}")
}

/// Install the global subscriber.
///
/// Returns the file writer guard when `log_dir` is set; keep it alive for the
/// lifetime of the process or buffered lines are lost on exit.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let console = fmt::layer().with_ansi(true).with_timer(LocalTimer);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Logging(format!("creating log directory {}: {}", dir.display(), e))
            })?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(format!("Failed to set global default subscriber: {}", e)))?;

    if let Some(dir) = log_dir {
        let removed = cleanup_old_logs(dir, LOG_RETENTION_DAYS)?;
        if removed > 0 {
            info!(count = removed, "Cleaned up old log files");
        }
    }

    Ok(guard)
}

/// Delete rolled log files older than `retention_days`. Returns how many were removed.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{}.", LOG_FILE_PREFIX);
    let mut deleted_count = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let path = entry?.path();

        if !path.is_file() {
            continue;
        }

        let date_str = match path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix.as_str()))
        {
            Some(date) => date,
            None => continue,
        };

        if let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            && file_date < cutoff
        {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    Ok(deleted_count)
}
