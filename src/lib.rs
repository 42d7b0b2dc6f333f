//! Branch discovery search client.
//!
//! [`client::BranchSearch`] is the entry point. Calls go through a
//! [`dispatch::ChannelDispatcher`] that keeps at most one call in flight per
//! channel, and every call reports back exactly once with either a parsed
//! result or a classified [`classify::SearchError`].

pub mod availability;
pub mod classify;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod parse;
pub mod payload;
pub mod transport;

pub use classify::{ErrorKind, Outcome, SearchError};
pub use client::BranchSearch;
pub use config::SearchConfig;
pub use dispatch::{CancelPolicy, Channel, ChannelDispatcher};
pub use error::AppError;
