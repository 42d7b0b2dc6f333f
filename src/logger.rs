//! Tracing subscriber setup for the CLI.
//!
//! The library only emits `tracing` events. The binary resolves a
//! [`LevelFilter`] from config (see [`parse_level`]) and installs the
//! subscriber once through [`init`].

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global subscriber, writing to stderr.
///
/// `level` is the default for every target. With `honour_rust_log`, any
/// directives in `RUST_LOG` are layered on top, so `RUST_LOG=branch_search::dispatch=trace`
/// narrows tracing to the dispatcher without touching the config. Bad
/// directives in `RUST_LOG` are skipped rather than failing startup.
pub fn init(level: LevelFilter, honour_rust_log: bool) -> Result<(), AppError> {
    let builder = EnvFilter::builder().with_default_directive(level.into());
    let filter = if honour_rust_log {
        builder.from_env_lossy()
    } else {
        builder.parse_lossy("")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Parse a configured level name (`off`, `error`, `warn`, `info`, `debug`,
/// `trace`; any case).
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    let trimmed = level.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config("log_level must not be empty".into()));
    }
    trimmed
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Config(format!("unrecognised log_level '{level}'")))
}
