//! File-based tracing output.
//!
//! The interactive session owns stdout, so log records go to daily-rotated
//! files under the state directory (see [`crate::config::get_state_dir`])
//! instead of the terminal. `RUST_LOG` selects the level, defaulting to
//! "info". Rotated files older than a week are pruned at startup.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;

/// Active log file name; rotation appends a `.YYYY-MM-DD` suffix.
const LOG_FILE_PREFIX: &str = "tessio.log";

/// Rotated files kept after pruning.
const MAX_LOG_FILES: usize = 7;

/// Keeps the non-blocking writer alive for the program lifetime.
static APPENDER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initializes the daily-rolling file subscriber. Errors when the state
/// directory is unavailable or a subscriber is already installed.
pub fn init_logging() -> Result<(), anyhow::Error> {
    let log_dir = crate::config::get_state_dir()?;
    prune_old_logs(&log_dir);

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));
    APPENDER_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Logging already initialized"))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .init();

    tracing::debug!("Logging to {}", log_dir.display());
    Ok(())
}

/// Deletes rotated log files beyond the newest [`MAX_LOG_FILES`].
///
/// Rotated names carry a `YYYY-MM-DD` suffix, so lexicographic order on the
/// file name is chronological and no metadata lookup is needed.
fn prune_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let mut rotated: Vec<String> = entries
        .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
        .filter(|name| {
            name.strip_prefix("tessio.log.")
                .is_some_and(|date| date.len() == 10)
        })
        .collect();
    rotated.sort_unstable_by(|a, b| b.cmp(a));

    for name in rotated.iter().skip(MAX_LOG_FILES) {
        let path = log_dir.join(name);
        if let Err(e) = fs::remove_file(&path) {
            eprintln!("Warning: failed to delete old log {}: {e}", path.display());
        }
    }
}
