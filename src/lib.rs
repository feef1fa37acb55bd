pub mod catalog;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod filter;
pub mod lifecycle;
pub mod models;
pub mod ordering;
pub mod planner;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod validation;

pub use crate::commands::{to_client_error, Command, CommandDispatcher};
pub use crate::config::PlannerConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::planner::PlannerCore;
pub use crate::session::Session;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// JSON logs into a daily rolling file under `log_dir`. `RUST_LOG` wins over
/// `default_filter`.
pub fn init_tracing(log_dir: &Path, default_filter: &str) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "trip-planner.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
