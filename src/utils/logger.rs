use crate::errors::{GamdlWebError, Result};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Logger utility for the application
pub struct Logger;

impl Logger {
    /// Initialize the logger with custom filter; `RUST_LOG` takes precedence
    pub fn init_with_filter(filter: &str) -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(filter))
            .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .try_init()
            .map_err(|e| GamdlWebError::Config(format!("Failed to initialize logger: {}", e)))?;

        Ok(())
    }

    /// Log configuration loaded
    pub fn log_config_loaded(download_dir: &str, tool: &str) {
        info!("Configuration loaded: downloads -> {}, tool -> {}", download_dir, tool);
    }

    /// Log job start
    pub fn log_job_start(job_id: &str, command: &str) {
        info!(job_id, "Starting download: {}", command);
    }

    /// Log job end
    pub fn log_job_finished(job_id: &str, outcome: &str) {
        info!(job_id, "Download finished: {}", outcome);
    }
}
