//! Core functionality for organising a photo collection.
//!
//! This library provides the components of the organising pipeline:
//! - File discovery and embedded metadata extraction
//! - Capture-date resolution and label extraction from paths
//! - Perceptual fingerprinting and near-duplicate grouping
//! - Destination planning and safe, copy-only file operations
//! - The run report written next to the organised photos

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use error::{Error, Result};
pub use pipeline::{
    CancellationToken, PhotoOrganiser, ProgressCallback, ProgressEvent, RunContext, RunState,
};
pub use report::{ReportEntry, RunOutcome, RunReport, Summary};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod dating;
pub mod deduplication;
pub mod discovery;
pub mod labels;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod placement;
pub mod processing;
pub mod report;
pub mod safety;
pub mod sidecar;
pub mod types;
