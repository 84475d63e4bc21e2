//! Destination layout.
//!
//! Photos land at `{dest}/{year}/{month:02}/[{event}/]{file name}`. Undated
//! photos go to `Unknown Date/00`, and a photo with only a year uses month
//! `00`. A path that exists on disk or was already handed out in this run
//! gets a `(n)` suffix before the extension.

use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::deduplication::DuplicateGroup;
use crate::types::{PartialDate, PhotoId, PhotoRecord};

/// Top-level folder for photos with no usable date
pub const UNKNOWN_DATE_DIR: &str = "Unknown Date";

/// Month folder used when the month is not known
pub const UNKNOWN_MONTH_DIR: &str = "00";

/// Representative id to destination path, all unique
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementPlan {
    destinations: BTreeMap<PhotoId, PathBuf>,
}

impl PlacementPlan {
    pub fn get(&self, id: PhotoId) -> Option<&Path> {
        self.destinations.get(&id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Entries in id order
    pub fn iter(&self) -> impl Iterator<Item = (PhotoId, &Path)> {
        self.destinations.iter().map(|(id, path)| (*id, path.as_path()))
    }
}

/// Insert `(n)` between stem and extension: `IMG_1.jpg` becomes `IMG_1(2).jpg`
pub fn disambiguated_name(file_name: &str, n: usize) -> String {
    let path = Path::new(file_name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{}({}).{}",
            stem.to_string_lossy(),
            n,
            ext.to_string_lossy()
        ),
        _ => format!("{}({})", file_name, n),
    }
}

/// First free path in `dir` for `file_name`, trying `(1)`, `(2)`, ... after the bare name
pub fn first_free_path(dir: &Path, file_name: &str, is_taken: impl Fn(&Path) -> bool) -> PathBuf {
    let candidate = dir.join(file_name);
    if !is_taken(&candidate) {
        return candidate;
    }

    let mut n = 1;
    loop {
        let candidate = dir.join(disambiguated_name(file_name, n));
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Whether anything, including a dangling symlink, occupies `path`
pub fn exists_on_disk(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Hands out unique destination paths under one root.
///
/// Claimed paths are compared case-insensitively so two names differing only
/// in case cannot collide on a case-insensitive filesystem.
#[derive(Debug)]
pub struct PlacementPlanner {
    destination_root: PathBuf,
    claimed: HashSet<String>,
}

impl PlacementPlanner {
    pub fn new(destination_root: &Path) -> Self {
        Self {
            destination_root: destination_root.to_path_buf(),
            claimed: HashSet::new(),
        }
    }

    /// Directory a record belongs in, before collision handling
    pub fn target_dir(&self, date: &PartialDate, event_label: Option<&str>) -> PathBuf {
        let mut dir = self.destination_root.clone();

        match date.year {
            Some(year) => {
                dir.push(format!("{:04}", year));
                match date.month {
                    Some(month) => dir.push(format!("{:02}", month)),
                    None => dir.push(UNKNOWN_MONTH_DIR),
                }
            }
            None => {
                dir.push(UNKNOWN_DATE_DIR);
                dir.push(UNKNOWN_MONTH_DIR);
            }
        }

        if let Some(label) = event_label {
            dir.push(label);
        }

        dir
    }

    fn claim_key(path: &Path) -> String {
        path.to_string_lossy().to_lowercase()
    }

    fn is_taken(&self, path: &Path) -> bool {
        self.claimed.contains(&Self::claim_key(path)) || exists_on_disk(path)
    }

    /// Reserve and return a free destination for `record`
    pub fn place(&mut self, record: &PhotoRecord) -> PathBuf {
        let dir = self.target_dir(&record.date, record.event_label.as_deref());
        let file_name = record.file_name();

        let destination = first_free_path(&dir, &file_name, |candidate| self.is_taken(candidate));
        if destination != dir.join(&file_name) {
            debug!(
                "Destination for '{}' taken, using '{}'",
                record.source.display(),
                destination.display()
            );
        }

        self.claimed.insert(Self::claim_key(&destination));
        destination
    }
}

/// Plan a destination for every group representative, in id order.
///
/// `records` must be indexed by id.
pub fn plan_placements(
    records: &[PhotoRecord],
    groups: &[DuplicateGroup],
    destination_root: &Path,
) -> PlacementPlan {
    let mut representatives: Vec<PhotoId> = groups.iter().map(|g| g.representative).collect();
    representatives.sort_unstable();

    let mut planner = PlacementPlanner::new(destination_root);
    let destinations = representatives
        .into_iter()
        .map(|id| (id, planner.place(&records[id])))
        .collect();

    PlacementPlan { destinations }
}
