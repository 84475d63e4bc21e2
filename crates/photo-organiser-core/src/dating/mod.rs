//! Capture-date resolution.
//!
//! A date is taken from the first strategy in the chain that produces one:
//! embedded metadata, then the containing folder's name, then the filename.
//! A photo no strategy can date is still organised, under the unknown bucket.

pub mod patterns;

use chrono::NaiveDateTime;
use std::path::Path;

use crate::types::{DateConfidence, PartialDate};

pub use patterns::{best_date, find_dates, is_camera_counter, is_date_only, DateMatch};

/// What a strategy gets to look at
#[derive(Debug, Clone, Copy)]
pub struct DateEvidence<'a> {
    /// Source path of the photo
    pub path: &'a Path,

    /// Timestamp read from embedded metadata
    pub metadata_timestamp: Option<NaiveDateTime>,
}

/// One source of capture dates
pub trait DateStrategy: Send + Sync {
    /// Tier assigned to dates this strategy produces
    fn confidence(&self) -> DateConfidence;

    /// Attempt to date the photo
    fn resolve(&self, evidence: &DateEvidence<'_>) -> Option<PartialDate>;
}

/// Embedded EXIF timestamp
pub struct MetadataStrategy;

impl DateStrategy for MetadataStrategy {
    fn confidence(&self) -> DateConfidence {
        DateConfidence::Exif
    }

    fn resolve(&self, evidence: &DateEvidence<'_>) -> Option<PartialDate> {
        evidence
            .metadata_timestamp
            .map(|timestamp| PartialDate::full(timestamp.date()))
    }
}

/// Name of the folder directly containing the file
pub struct FolderNameStrategy;

impl DateStrategy for FolderNameStrategy {
    fn confidence(&self) -> DateConfidence {
        DateConfidence::FolderName
    }

    fn resolve(&self, evidence: &DateEvidence<'_>) -> Option<PartialDate> {
        let folder = evidence.path.parent()?.file_name()?.to_str()?;
        best_date(folder)
    }
}

/// The file's own name, without its extension
pub struct FilenameStrategy;

impl DateStrategy for FilenameStrategy {
    fn confidence(&self) -> DateConfidence {
        DateConfidence::Filename
    }

    fn resolve(&self, evidence: &DateEvidence<'_>) -> Option<PartialDate> {
        let stem = evidence.path.file_stem()?.to_str()?;

        // IMG_2011.jpg is a frame counter, not a year
        if is_camera_counter(stem) {
            return None;
        }

        best_date(stem)
    }
}

/// Ordered chain of date strategies; the first success wins
pub struct DateResolver {
    strategies: Vec<Box<dyn DateStrategy>>,
}

impl DateResolver {
    /// The standard chain: metadata, folder name, filename
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(MetadataStrategy),
            Box::new(FolderNameStrategy),
            Box::new(FilenameStrategy),
        ])
    }

    /// Build a resolver from a custom chain
    pub fn with_strategies(strategies: Vec<Box<dyn DateStrategy>>) -> Self {
        Self { strategies }
    }

    /// Resolve a date and its tier; `Unknown` when nothing matches
    pub fn resolve(&self, evidence: &DateEvidence<'_>) -> (PartialDate, DateConfidence) {
        self.strategies
            .iter()
            .find_map(|strategy| {
                strategy
                    .resolve(evidence)
                    .map(|date| (date, strategy.confidence()))
            })
            .unwrap_or((PartialDate::unknown(), DateConfidence::Unknown))
    }
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new()
    }
}
