use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logging::log_fs_modification;
use crate::placement::{exists_on_disk, first_free_path};
use crate::types::{DateConfidence, PhotoRecord};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Done,
    Cancelled,
    Failed,
}

/// One line of the report, per discovered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub year: Option<i32>,

    /// `0` when the month is unknown
    pub month: u32,
    pub day: Option<u32>,
    pub date_confidence: DateConfidence,
    pub event_label: Option<String>,
    pub location_token: Option<String>,
    pub duplicate_group_id: Option<usize>,
    pub was_representative: bool,
    pub error: Option<String>,

    /// Label write failure on a photo that was still copied
    pub metadata_error: Option<String>,
}

impl ReportEntry {
    pub fn from_record(record: &PhotoRecord, destination: Option<PathBuf>, was_representative: bool) -> Self {
        Self {
            source: record.source.clone(),
            destination,
            year: record.date.year,
            month: record.date.month.unwrap_or(0),
            day: record.date.day,
            date_confidence: record.confidence,
            event_label: record.event_label.clone(),
            location_token: record.location_token.clone(),
            duplicate_group_id: record.group_id,
            was_representative,
            error: record.error.clone(),
            metadata_error: record.metadata_error.clone(),
        }
    }

    /// Entry for a path the scan could not even turn into a record
    pub fn scan_error(path: PathBuf, reason: String) -> Self {
        Self {
            source: path,
            destination: None,
            year: None,
            month: 0,
            day: None,
            date_confidence: DateConfidence::Unknown,
            event_label: None,
            location_token: None,
            duplicate_group_id: None,
            was_representative: false,
            error: Some(reason),
            metadata_error: None,
        }
    }

    /// Whether this entry was left out as a duplicate of another photo
    pub fn is_skipped_duplicate(&self) -> bool {
        self.duplicate_group_id.is_some() && !self.was_representative && self.error.is_none()
    }
}

/// Totals for the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Image files found by the scan
    pub scanned: usize,
    pub copied: usize,
    pub duplicates_skipped: usize,
    pub errors: usize,

    /// Copies whose labels could not be written
    pub metadata_errors: usize,
    pub outcome: RunOutcome,
    pub failure: Option<String>,
}

/// Everything a run did, in scan order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub entries: Vec<ReportEntry>,
    pub summary: Summary,

    /// Where the report was written, if it could be
    #[serde(skip)]
    pub report_path: Option<PathBuf>,
}

impl RunReport {
    /// Build a report, deriving the skip and error counts from the entries
    pub fn new(
        entries: Vec<ReportEntry>,
        scanned: usize,
        outcome: RunOutcome,
        failure: Option<String>,
    ) -> Self {
        let copied = entries.iter().filter(|e| e.destination.is_some()).count();
        let duplicates_skipped = entries.iter().filter(|e| e.is_skipped_duplicate()).count();
        let errors = entries.iter().filter(|e| e.error.is_some()).count();
        let metadata_errors = entries.iter().filter(|e| e.metadata_error.is_some()).count();

        Self {
            entries,
            summary: Summary {
                scanned,
                copied,
                duplicates_skipped,
                errors,
                metadata_errors,
                outcome,
                failure,
            },
            report_path: None,
        }
    }

    /// A run that stopped before producing any entries
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Vec::new(), 0, RunOutcome::Failed, Some(message.into()))
    }

    pub fn outcome(&self) -> RunOutcome {
        self.summary.outcome
    }

    /// Report paths must never collide across entries
    pub fn destinations(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().filter_map(|e| e.destination.as_deref())
    }
}

/// Serialize `report` into `destination_root` without replacing an existing file.
///
/// If `file_name` is taken the report goes to `name(1).json`, `name(2).json`, ...
pub fn write_report(report: &RunReport, destination_root: &Path, file_name: &str) -> Result<PathBuf> {
    let (path, file) = create_unique(destination_root, file_name)?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| Error::filesystem(&path, e))?;

    log_fs_modification(
        "write_report",
        &path,
        Some(&format!("{} entries", report.entries.len())),
    );
    info!("Report written to {}", path.display());
    Ok(path)
}

fn create_unique(dir: &Path, file_name: &str) -> Result<(PathBuf, File)> {
    loop {
        let path = first_free_path(dir, file_name, exists_on_disk);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            // Lost a race with another writer; look for the next free name
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::filesystem(&path, e)),
        }
    }
}
