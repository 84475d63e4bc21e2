//! Near-duplicate grouping.
//!
//! Two photos are "near" when their fingerprints differ in at most
//! `threshold` bits. Groups are the connected components of that relation,
//! so a chain of near pairs joins its endpoints even when they are far apart.

mod disjoint_set;

pub use disjoint_set::DisjointSet;

use log::{debug, info};
use std::cmp::Ordering;

use crate::processing::Fingerprint;
use crate::types::{PhotoId, PhotoRecord};

/// A set of perceptually similar photos and the one chosen to be copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Sequential id, in order of each group's smallest member
    pub id: usize,

    /// Member record ids, ascending
    pub members: Vec<PhotoId>,

    /// The member that gets copied
    pub representative: PhotoId,
}

impl DuplicateGroup {
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    /// Members that will be reported as skipped duplicates
    pub fn skipped(&self) -> impl Iterator<Item = PhotoId> + '_ {
        let representative = self.representative;
        self.members.iter().copied().filter(move |id| *id != representative)
    }
}

/// Preference order between two candidates; `Less` means `a` is the better copy.
///
/// Higher confidence tier first, then the earlier date, then the larger file,
/// then the smaller path.
pub fn representative_cmp(a: &PhotoRecord, b: &PhotoRecord) -> Ordering {
    b.confidence
        .cmp(&a.confidence)
        .then_with(|| a.date.chronological_cmp(&b.date))
        .then_with(|| b.size.cmp(&a.size))
        .then_with(|| a.source.cmp(&b.source))
}

/// Pick the representative among `members`.
///
/// `members` index into `records`. Returns `None` for an empty slice.
pub fn select_representative(members: &[PhotoId], records: &[PhotoRecord]) -> Option<PhotoId> {
    members
        .iter()
        .copied()
        .min_by(|a, b| representative_cmp(&records[*a], &records[*b]))
}

/// Group every usable record and choose one representative per group.
///
/// `records` must be indexed by id. Records with an error are left out and
/// get no group. A record without a fingerprint is its own singleton group.
/// Comparison is all-pairs, which is fine for personal collections of a few
/// tens of thousands of photos.
pub fn group_duplicates(records: &[PhotoRecord], threshold: u32) -> Vec<DuplicateGroup> {
    let candidates: Vec<(PhotoId, Option<Fingerprint>)> = records
        .iter()
        .filter(|record| record.is_ok())
        .map(|record| (record.id, record.fingerprint))
        .collect();

    let mut sets = DisjointSet::new(candidates.len());
    let mut links = 0usize;

    for i in 0..candidates.len() {
        let Some(a) = candidates[i].1 else {
            continue;
        };
        for j in (i + 1)..candidates.len() {
            let Some(b) = candidates[j].1 else {
                continue;
            };
            if a.is_similar(&b, threshold) && sets.union(i, j) {
                links += 1;
            }
        }
    }

    // Candidates are in id order, so component order follows smallest member id
    let groups: Vec<DuplicateGroup> = sets
        .components()
        .into_iter()
        .enumerate()
        .filter_map(|(group_id, component)| {
            let members: Vec<PhotoId> = component.iter().map(|&i| candidates[i].0).collect();
            let representative = select_representative(&members, records)?;
            Some(DuplicateGroup {
                id: group_id,
                members,
                representative,
            })
        })
        .collect();

    for group in groups.iter().filter(|g| !g.is_singleton()) {
        debug!(
            "Duplicate group {} has {} members, keeping '{}'",
            group.id,
            group.members.len(),
            records[group.representative].source.display()
        );
    }

    info!(
        "Grouped {} photos into {} groups ({} merges, threshold {})",
        candidates.len(),
        groups.len(),
        links,
        threshold
    );

    groups
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DateConfidence, PartialDate};
    use std::path::PathBuf;

    fn record(id: PhotoId, name: &str, fingerprint: u64) -> PhotoRecord {
        let mut record = PhotoRecord::new(id, PathBuf::from(format!("/src/{}", name)), 1000);
        record.fingerprint = Some(Fingerprint(fingerprint));
        record
    }

    #[test]
    fn test_chain_joins_far_endpoints() {
        // d(A,B)=3, d(B,C)=4, d(A,C)=7
        let a = 0u64;
        let b = 0b111u64;
        let c = 0b111_1111u64;
        assert_eq!(Fingerprint(a).distance(&Fingerprint(b)), 3);
        assert_eq!(Fingerprint(b).distance(&Fingerprint(c)), 4);
        assert_eq!(Fingerprint(a).distance(&Fingerprint(c)), 7);

        let records = vec![record(0, "a.jpg", a), record(1, "b.jpg", b), record(2, "c.jpg", c)];
        let groups = group_duplicates(&records, 5);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![0, 1, 2]);
    }

    #[test]
    fn test_distinct_images_stay_singletons() {
        let records = vec![
            record(0, "a.jpg", 0),
            record(1, "b.jpg", u64::MAX),
            record(2, "c.jpg", 0xFFFF_0000_FFFF_0000),
        ];
        let groups = group_duplicates(&records, 5);

        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.is_singleton()));
        assert_eq!(
            groups.iter().map(|g| g.id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_group_ids_follow_smallest_member() {
        let records = vec![
            record(0, "a.jpg", u64::MAX),
            record(1, "b.jpg", 0),
            record(2, "c.jpg", u64::MAX - 1),
            record(3, "d.jpg", 1),
        ];
        let groups = group_duplicates(&records, 5);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![0, 2]);
        assert_eq!(groups[1].members, vec![1, 3]);
    }

    #[test]
    fn test_errored_records_excluded() {
        let mut broken = record(1, "b.jpg", 0);
        broken.error = Some("cannot decode".to_string());

        let records = vec![record(0, "a.jpg", 0), broken];
        let groups = group_duplicates(&records, 5);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![0]);
    }

    #[test]
    fn test_unhashed_record_is_its_own_group() {
        let mut heic = record(1, "b.heic", 0);
        heic.fingerprint = None;

        let records = vec![record(0, "a.jpg", 0), heic, record(2, "c.jpg", 0)];
        let groups = group_duplicates(&records, 5);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![0, 2]);
        assert_eq!(groups[1].members, vec![1]);
        assert_eq!(groups[1].representative, 1);
    }

    #[test]
    fn test_higher_tier_wins() {
        let mut filename = record(0, "a.jpg", 0);
        filename.confidence = DateConfidence::Filename;
        filename.size = 5000;
        let mut exif = record(1, "b.jpg", 0);
        exif.confidence = DateConfidence::Exif;

        let records = vec![filename, exif];
        assert_eq!(select_representative(&[0, 1], &records), Some(1));
    }

    #[test]
    fn test_earlier_date_wins_within_tier() {
        let mut later = record(0, "a.jpg", 0);
        later.confidence = DateConfidence::FolderName;
        later.date = PartialDate::year_month(2012, 1);
        let mut earlier = record(1, "b.jpg", 0);
        earlier.confidence = DateConfidence::FolderName;
        earlier.date = PartialDate::year_month(2011, 12);

        let records = vec![later, earlier];
        assert_eq!(select_representative(&[0, 1], &records), Some(1));
    }

    #[test]
    fn test_larger_size_wins_on_equal_tier_and_date() {
        let mut small = record(0, "a.jpg", 0);
        small.size = 1_000;
        let mut large = record(1, "b.jpg", 0);
        large.size = 2_000;

        let records = vec![small, large];
        let groups = group_duplicates(&records, 5);
        assert_eq!(groups[0].representative, 1);
        assert_eq!(groups[0].skipped().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_path_breaks_final_tie() {
        let records = vec![record(0, "b.jpg", 0), record(1, "a.jpg", 0)];
        assert_eq!(select_representative(&[0, 1], &records), Some(1));
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let records: Vec<PhotoRecord> = (0..12)
            .map(|i| record(i, &format!("img_{:02}.jpg", i), (i as u64 % 3) << (i % 5)))
            .collect();

        let first = group_duplicates(&records, 2);
        let second = group_duplicates(&records, 2);
        assert_eq!(first, second);
    }
}
