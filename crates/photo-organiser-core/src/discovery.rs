use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::log_file_error;

/// A candidate image found during the scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

/// Outcome of walking the source tree
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Image files, sorted by path
    pub files: Vec<DiscoveredFile>,

    /// Entries that could not be read, with the reason
    pub errors: Vec<(PathBuf, String)>,
}

/// Discover images under `source_root`, skipping anything inside `excluded`.
///
/// The result is sorted by path so record ids are stable between runs.
pub fn discover_images(
    source_root: &Path,
    excluded: Option<&Path>,
    config: &Config,
) -> Result<ScanOutcome> {
    if !source_root.exists() {
        return Err(Error::FileNotFound(source_root.to_path_buf()));
    }
    if !source_root.is_dir() {
        return Err(Error::Configuration(format!(
            "Source root is not a directory: {}",
            source_root.display()
        )));
    }

    // Determine max depth for directory traversal
    let max_depth = config.max_depth.unwrap_or(usize::MAX);

    let mut outcome = ScanOutcome::default();

    let walker = WalkDir::new(source_root)
        .max_depth(max_depth)
        .follow_links(config.follow_links)
        .into_iter()
        .filter_entry(|entry| match excluded {
            Some(excluded) => !entry.path().starts_with(excluded),
            None => true,
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source_root.to_path_buf());
                log_file_error(&path, "walk", &e);
                outcome.errors.push((path, e.to_string()));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !config.is_recognized_extension(path) {
            continue;
        }

        match fs::metadata(path) {
            Ok(metadata) => outcome.files.push(DiscoveredFile {
                path: path.to_path_buf(),
                size: metadata.len(),
            }),
            Err(e) => {
                // Log error but continue with other files
                log_file_error(path, "metadata", &e);
                outcome.errors.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));
    outcome.errors.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(outcome)
}

// -- Tests --
