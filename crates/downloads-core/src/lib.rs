//! Shared building blocks for the release download reports.
//!
//! Holds the log record and report models, the error type, CLI settings,
//! timezone handling and the progress-reporting interface.

pub mod error;
pub mod models;
pub mod progress;
pub mod settings;
pub mod time_utils;

pub use error::{DownloadsError, Result};
