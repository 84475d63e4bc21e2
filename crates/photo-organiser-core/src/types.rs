use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use crate::processing::Fingerprint;

/// Index of a record in the path-sorted scan order
pub type PhotoId = usize;

/// Supported image formats
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Tiff,
    Heic,
    Webp,
    Bmp,
    Other(String),
}

impl ImageFormat {
    /// Determine format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "tif" | "tiff" => Self::Tiff,
            "heic" => Self::Heic,
            "webp" => Self::Webp,
            "bmp" => Self::Bmp,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the format can carry an embedded EXIF block
    pub fn may_carry_exif(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Tiff | Self::Heic | Self::Webp | Self::Png)
    }
}

/// How trustworthy a resolved capture date is.
///
/// Variants are declared from least to most trusted so the derived `Ord`
/// ranks `Exif` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DateConfidence {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "filename")]
    Filename,
    #[serde(rename = "folder-name")]
    FolderName,
    #[serde(rename = "exif")]
    Exif,
}

impl fmt::Display for DateConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DateConfidence::Unknown => "unknown",
            DateConfidence::Filename => "filename",
            DateConfidence::FolderName => "folder-name",
            DateConfidence::Exif => "exif",
        };
        f.write_str(label)
    }
}

/// A capture date where only some components may be known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PartialDate {
    /// A date with nothing known
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            month: None,
            day: None,
        }
    }

    pub fn year_month(year: i32, month: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: None,
        }
    }

    pub fn full(date: NaiveDate) -> Self {
        Self {
            year: Some(date.year()),
            month: Some(date.month()),
            day: Some(date.day()),
        }
    }

    /// Number of populated components, used to rank competing matches
    pub fn specificity(&self) -> usize {
        [self.year.is_some(), self.month.is_some(), self.day.is_some()]
            .iter()
            .filter(|known| **known)
            .count()
    }

    pub fn is_unknown(&self) -> bool {
        self.year.is_none()
    }

    /// Chronological ordering where a missing component sorts after any known one
    pub fn chronological_cmp(&self, other: &PartialDate) -> Ordering {
        fn key<T: Ord + Copy>(value: Option<T>) -> (bool, Option<T>) {
            (value.is_none(), value)
        }
        key(self.year)
            .cmp(&key(other.year))
            .then_with(|| key(self.month).cmp(&key(other.month)))
            .then_with(|| key(self.day).cmp(&key(other.day)))
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => write!(f, "{:04}-{:02}-{:02}", y, m, d),
            (Some(y), Some(m), None) => write!(f, "{:04}-{:02}", y, m),
            (Some(y), _, _) => write!(f, "{:04}", y),
            _ => f.write_str("unknown"),
        }
    }
}

/// One discovered image file and everything inferred about it
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    /// Position in the sorted scan order
    pub id: PhotoId,

    /// Full path to the source file
    pub source: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Image format guessed from the extension
    pub format: ImageFormat,

    /// Embedded capture timestamp, if the file carried one
    pub metadata_timestamp: Option<NaiveDateTime>,

    /// Best-guess capture date
    pub date: PartialDate,

    /// Where `date` came from
    pub confidence: DateConfidence,

    /// Event label taken from the containing folder
    pub event_label: Option<String>,

    /// Place name taken from the filename
    pub location_token: Option<String>,

    /// Perceptual fingerprint, set during hashing
    pub fingerprint: Option<Fingerprint>,

    /// Duplicate group, set during deduplication
    pub group_id: Option<usize>,

    /// Per-file failure that excluded the record from later stages
    pub error: Option<String>,

    /// Labels could not be embedded or written beside the copy; the copy stands
    pub metadata_error: Option<String>,
}

impl PhotoRecord {
    /// Create a freshly discovered record with nothing resolved yet
    pub fn new(id: PhotoId, source: PathBuf, size: u64) -> Self {
        let format = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(ImageFormat::from_extension)
            .unwrap_or_else(|| ImageFormat::Other(String::new()));

        Self {
            id,
            source,
            size,
            format,
            metadata_timestamp: None,
            date: PartialDate::unknown(),
            confidence: DateConfidence::Unknown,
            event_label: None,
            location_token: None,
            fingerprint: None,
            group_id: None,
            error: None,
            metadata_error: None,
        }
    }

    /// Whether the record is still eligible for hashing, grouping and copying
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Original file name, as it will appear at the destination
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
