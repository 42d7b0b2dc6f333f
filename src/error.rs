//! Application-wide setup error types.
//!
//! These never reach a request callback; per-request failures are
//! [`crate::classify::SearchError`] values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("execution pool error: {0}")]
    Pool(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid branch key: {0:?}")]
    InvalidKey(String),
}
