use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::processing::HashAlgorithm;

/// Default Hamming distance (out of 64 bits) under which two photos are "near"
pub const DEFAULT_SIMILARITY_THRESHOLD: u32 = 5;

/// File name of the run report written at the destination root
pub const DEFAULT_REPORT_FILE_NAME: &str = "photo_index.json";

/// How surviving photos reach the destination.
///
/// Only copying is supported: the source tree is never modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CopyMode {
    #[default]
    Copy,
}

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to the `log` crate's filter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Configuration for an organising run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum Hamming distance for two fingerprints to be considered duplicates
    pub similarity_threshold: u32,

    /// Perceptual hash algorithm used for fingerprints
    pub hash_algorithm: HashAlgorithm,

    /// How photos are transferred (always a copy)
    pub copy_mode: CopyMode,

    /// File extensions (without dot, case-insensitive) treated as images
    pub recognized_extensions: Vec<String>,

    /// Maximum directory depth for scanning
    pub max_depth: Option<usize>,

    /// Whether to follow symbolic links while scanning
    pub follow_links: bool,

    /// Number of threads to use for processing (0 = auto)
    pub threads: usize,

    /// Folder names that never become event labels
    pub generic_folder_names: Vec<String>,

    /// Place names recognised in filenames
    pub location_vocabulary: Vec<String>,

    /// Whether to write an XMP sidecar with event/location next to each copy
    pub write_sidecars: bool,

    /// Whether to merge event/location into the EXIF block of JPEG copies
    pub embed_labels: bool,

    /// Whether to re-hash each copy and compare it against the source
    pub verify_copies: bool,

    /// Whether copies keep the source modification time
    pub preserve_timestamps: bool,

    /// Per-file time limit for fingerprinting, in seconds
    pub hash_timeout_secs: u64,

    /// Name of the JSON report written at the destination root
    pub report_file_name: String,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            hash_algorithm: HashAlgorithm::Mean,
            copy_mode: CopyMode::Copy,
            recognized_extensions: ["jpg", "jpeg", "png", "heic", "webp", "tiff", "tif", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_depth: None,
            follow_links: false,
            threads: 0, // Auto
            generic_folder_names: [
                "DCIM",
                "Camera",
                "Camera Roll",
                "Photos",
                "Pictures",
                "Images",
                "Misc",
                "Miscellaneous",
                "Downloads",
                "Unsorted",
                "New folder",
                "Untitled",
                "Backup",
                "Export",
                "Exports",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            location_vocabulary: [
                "Paris",
                "London",
                "Tokyo",
                "New York",
                "Cork",
                "Dublin",
                "Rome",
                "Berlin",
                "Madrid",
                "Barcelona",
                "Lisbon",
                "Amsterdam",
                "Galway",
                "Belfast",
                "Edinburgh",
                "Venice",
                "Florence",
                "Prague",
                "Vienna",
                "Sydney",
                "San Francisco",
                "Los Angeles",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            write_sidecars: true,
            embed_labels: true,
            verify_copies: true,
            preserve_timestamps: true,
            hash_timeout_secs: 30,
            report_file_name: DEFAULT_REPORT_FILE_NAME.to_string(),
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Fingerprints are 64 bits wide
        if self.similarity_threshold > 64 {
            return Err(Error::Configuration(
                "Similarity threshold must be between 0 and 64".to_string(),
            ));
        }

        if self.recognized_extensions.is_empty() {
            return Err(Error::Configuration(
                "At least one image extension must be recognised".to_string(),
            ));
        }

        if self
            .recognized_extensions
            .iter()
            .any(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err(Error::Configuration(
                "Extensions must be non-empty and given without a leading dot".to_string(),
            ));
        }

        if self.hash_timeout_secs == 0 {
            return Err(Error::Configuration(
                "Hash timeout must be at least one second".to_string(),
            ));
        }

        let report = Path::new(&self.report_file_name);
        if self.report_file_name.is_empty() || report.components().count() != 1 {
            return Err(Error::Configuration(
                "Report file name must be a plain file name".to_string(),
            ));
        }

        Ok(())
    }

    /// Check whether a path carries one of the recognised image extensions
    pub fn is_recognized_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.recognized_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Effective worker count for the thread pool
    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

// -- Tests --
