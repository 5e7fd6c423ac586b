//! Data layer for the release download reports.
//!
//! Responsible for discovering and reading usage CSV exports, filtering rows
//! down to installer downloads, aggregating monthly counts, estimating unique
//! downloads in an embedded SQLite store, writing the CSV reports, and running
//! the top-level analysis pipeline.

pub mod aggregator;
pub mod analysis;
pub mod estimator;
pub mod filter;
pub mod reader;
pub mod writer;

pub use downloads_core as core;
