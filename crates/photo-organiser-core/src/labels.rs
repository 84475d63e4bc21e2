//! Event labels and location tokens.

use std::path::Path;

use crate::config::Config;
use crate::dating::is_date_only;

/// Words that look like place names but are produced by cameras, phones and editors
const GENERIC_FILENAME_WORDS: &[&str] = &[
    "copy",
    "edit",
    "edited",
    "final",
    "image",
    "photo",
    "picture",
    "screenshot",
    "scan",
    "untitled",
    "new",
    "version",
    "large",
    "small",
    "thumb",
    "original",
    "export",
    "duplicate",
    "whatsapp",
    "burst",
    "portrait",
    "panorama",
];

const MONTH_WORDS: &[&str] = &[
    "jan", "january", "feb", "february", "mar", "march", "apr", "april", "may", "jun", "june",
    "jul", "july", "aug", "august", "sep", "sept", "september", "oct", "october", "nov",
    "november", "dec", "december",
];

/// Extracts advisory labels from a photo's path
#[derive(Debug, Clone)]
pub struct LabelExtractor {
    /// Lowercased generic folder names
    generic_folders: Vec<String>,

    /// Canonical place name with its lowercased words
    vocabulary: Vec<(String, Vec<String>)>,
}

impl LabelExtractor {
    pub fn new(config: &Config) -> Self {
        let generic_folders = config
            .generic_folder_names
            .iter()
            .map(|name| name.trim().to_lowercase())
            .collect();

        let mut vocabulary: Vec<(String, Vec<String>)> = config
            .location_vocabulary
            .iter()
            .map(|place| (place.clone(), split_words(place).map(str::to_lowercase).collect()))
            .filter(|(_, words): &(String, Vec<String>)| !words.is_empty())
            .collect();

        // Longer place names first so "New York" wins over a plain "York"
        vocabulary.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        Self {
            generic_folders,
            vocabulary,
        }
    }

    /// Name of the containing folder, unless it is the root, a date or a generic name
    pub fn event_label(&self, path: &Path, source_root: &Path) -> Option<String> {
        let parent = path.parent()?;
        if parent == source_root {
            return None;
        }

        let name = parent.file_name()?.to_str()?.trim();
        if name.is_empty() {
            return None;
        }

        let root_name = source_root.file_name().and_then(|n| n.to_str());
        if root_name.is_some_and(|root| root.eq_ignore_ascii_case(name)) {
            return None;
        }

        let lowered = name.to_lowercase();
        if self.generic_folders.iter().any(|generic| *generic == lowered) {
            return None;
        }

        if is_date_only(name) {
            return None;
        }

        Some(name.to_string())
    }

    /// A place name found in the filename, from the vocabulary or a capitalised word
    pub fn location_token(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        let words: Vec<&str> = split_words(stem).collect();
        let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

        for start in 0..lowered.len() {
            for (canonical, place) in &self.vocabulary {
                if lowered[start..].starts_with(place) {
                    return Some(canonical.clone());
                }
            }
        }

        words
            .iter()
            .find(|word| looks_like_place(word))
            .map(|word| word.to_string())
    }
}

/// Split on anything that is not a letter or digit
fn split_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
}

/// A `Capitalised` alphabetic word that is not a month or a generic camera word
fn looks_like_place(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    if word.chars().count() < 3 || !first.is_uppercase() {
        return false;
    }
    if !chars.all(|c| c.is_alphabetic() && c.is_lowercase()) {
        return false;
    }

    let lowered = word.to_lowercase();
    !MONTH_WORDS.contains(&lowered.as_str()) && !GENERIC_FILENAME_WORDS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LabelExtractor {
        LabelExtractor::new(&Config::default())
    }

    #[test]
    fn test_event_label_from_parent_folder() {
        let label = extractor().event_label(
            Path::new("/photos/2011/Wedding/IMG_1.jpg"),
            Path::new("/photos"),
        );
        assert_eq!(label.as_deref(), Some("Wedding"));
    }

    #[test]
    fn test_no_event_label_for_root() {
        let label = extractor().event_label(Path::new("/photos/IMG_1.jpg"), Path::new("/photos"));
        assert_eq!(label, None);
    }

    #[test]
    fn test_no_event_label_for_date_folder() {
        let e = extractor();
        let root = Path::new("/photos");
        assert_eq!(e.event_label(Path::new("/photos/August 2011/a.jpg"), root), None);
        assert_eq!(e.event_label(Path::new("/photos/2011/a.jpg"), root), None);
        assert_eq!(e.event_label(Path::new("/photos/15-08-2011/a.jpg"), root), None);
    }

    #[test]
    fn test_event_label_keeps_named_folder_with_year() {
        let label = extractor().event_label(
            Path::new("/photos/Holiday 2020/IMG_1.jpg"),
            Path::new("/photos"),
        );
        assert_eq!(label.as_deref(), Some("Holiday 2020"));
    }

    #[test]
    fn test_no_event_label_for_generic_folder() {
        let e = extractor();
        let root = Path::new("/photos");
        assert_eq!(e.event_label(Path::new("/photos/Misc/IMG_1_copy.jpg"), root), None);
        assert_eq!(e.event_label(Path::new("/photos/dcim/IMG_1.jpg"), root), None);
    }

    #[test]
    fn test_no_event_label_for_folder_named_like_root() {
        let label = extractor().event_label(
            Path::new("/home/me/Photos Backup/2019/Photos Backup/IMG_1.jpg"),
            Path::new("/home/me/Photos Backup"),
        );
        assert_eq!(label, None);
    }

    #[test]
    fn test_location_from_vocabulary() {
        let e = extractor();
        assert_eq!(e.location_token(Path::new("/p/paris_trip_01.jpg")).as_deref(), Some("Paris"));
        assert_eq!(
            e.location_token(Path::new("/p/NEW-YORK skyline.jpg")).as_deref(),
            Some("New York")
        );
    }

    #[test]
    fn test_location_from_capitalised_word() {
        let e = extractor();
        assert_eq!(
            e.location_token(Path::new("/p/IMG_1203_Kinsale.jpg")).as_deref(),
            Some("Kinsale")
        );
    }

    #[test]
    fn test_location_ignores_camera_and_month_words() {
        let e = extractor();
        assert_eq!(e.location_token(Path::new("/p/IMG_1234.jpg")), None);
        assert_eq!(e.location_token(Path::new("/p/August_2011_Copy.jpg")), None);
        assert_eq!(e.location_token(Path::new("/p/DSC_0001_edited.jpg")), None);
    }
}
