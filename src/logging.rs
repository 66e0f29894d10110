//! Logging setup
//!
//! Call `init_logging()` once at process start. The filter comes from
//! `RUST_LOG` (default `info`). `init_logging_with_file` additionally
//! mirrors structured JSON lines into a daily-rolling file; keep the
//! returned guard alive for the process lifetime or buffered lines are
//! lost.

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize console logging
pub fn init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().compact())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
    Ok(())
}

/// Initialize console logging plus a daily-rolling JSON log file
pub fn init_logging_with_file(dir: impl AsRef<Path>) -> Result<WorkerGuard> {
    let appender = tracing_appender::rolling::daily(dir.as_ref(), "hookwork.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().compact())
        .with(fmt::layer().json().with_writer(writer))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_once_then_fail() {
        let temp = TempDir::new().unwrap();
        let guard = init_logging_with_file(temp.path()).unwrap();

        tracing::info!("logging initialized");

        // The global subscriber is already set; a second init must fail
        // instead of silently replacing it
        assert!(init_logging().is_err());

        drop(guard);
        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert!(!entries.is_empty());
    }
}
