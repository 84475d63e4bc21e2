//! XMP sidecars carrying the advisory labels.
//!
//! The event label and location token go into `<file>.<ext>.xmp` next to
//! the copy, which Lightroom, darktable and digiKam all pick up. This covers
//! every format, including those whose EXIF block is not rewritten.

use log::warn;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logging::log_fs_modification;
use crate::types::{PartialDate, PhotoRecord};

/// What gets written into a sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidecarContent<'a> {
    pub event_label: Option<&'a str>,
    pub location_token: Option<&'a str>,
    pub date: PartialDate,
}

impl<'a> SidecarContent<'a> {
    pub fn from_record(record: &'a PhotoRecord) -> Self {
        Self {
            event_label: record.event_label.as_deref(),
            location_token: record.location_token.as_deref(),
            date: record.date,
        }
    }

    /// No labels means nothing worth a sidecar
    pub fn is_empty(&self) -> bool {
        self.event_label.is_none() && self.location_token.is_none()
    }

    /// Render the XMP packet
    pub fn to_xmp(&self) -> String {
        let mut attributes = String::new();
        if let Some(location) = self.location_token {
            let location = escape_xml(location);
            attributes.push_str(&format!("\n    photoshop:City=\"{}\"", location));
            attributes.push_str(&format!("\n    Iptc4xmpCore:Location=\"{}\"", location));
        }
        if !self.date.is_unknown() {
            // XMP dates may be truncated to year or year-month
            attributes.push_str(&format!("\n    photoshop:DateCreated=\"{}\"", self.date));
        }

        let subject = match self.event_label {
            Some(event) => format!(
                ">\n   <dc:subject>\n    <rdf:Bag>\n     <rdf:li>{}</rdf:li>\n    </rdf:Bag>\n   </dc:subject>\n  </rdf:Description>",
                escape_xml(event)
            ),
            None => "/>".to_string(),
        };

        format!(
            concat!(
                "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n",
                "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n",
                " <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
                "  <rdf:Description rdf:about=\"\"\n",
                "    xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n",
                "    xmlns:photoshop=\"http://ns.adobe.com/photoshop/1.0/\"\n",
                "    xmlns:Iptc4xmpCore=\"http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/\"{}{}\n",
                " </rdf:RDF>\n",
                "</x:xmpmeta>\n",
                "<?xpacket end=\"w\"?>\n"
            ),
            attributes, subject
        )
    }
}

/// `IMG_1.jpg` -> `IMG_1.jpg.xmp`
pub fn sidecar_path(photo: &Path) -> PathBuf {
    let mut name = photo.as_os_str().to_os_string();
    name.push(".xmp");
    PathBuf::from(name)
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Write the sidecar for a copied photo.
///
/// Returns `None` when there is nothing to record or a sidecar file is
/// already present; an existing sidecar is left untouched. Anything else
/// occupying the sidecar path is an error.
pub fn write_sidecar(photo: &Path, content: &SidecarContent<'_>) -> Result<Option<PathBuf>> {
    if content.is_empty() {
        return Ok(None);
    }

    let path = sidecar_path(photo);
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_file() => {
            warn!("Sidecar already exists, leaving it alone: {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(Error::filesystem(&path, e)),
    };

    file.write_all(content.to_xmp().as_bytes())
        .map_err(|e| Error::filesystem(&path, e))?;

    log_fs_modification("write_sidecar", &path, None);
    Ok(Some(path))
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sidecar_path_keeps_extension() {
        assert_eq!(
            sidecar_path(Path::new("/dest/2011/08/IMG_1.JPG")),
            PathBuf::from("/dest/2011/08/IMG_1.JPG.xmp")
        );
    }

    #[test]
    fn test_xmp_contains_labels() {
        let content = SidecarContent {
            event_label: Some("Tom & Ann's Wedding"),
            location_token: Some("Paris"),
            date: PartialDate::year_month(2011, 8),
        };
        let xmp = content.to_xmp();

        assert!(xmp.contains("<rdf:li>Tom &amp; Ann&apos;s Wedding</rdf:li>"));
        assert!(xmp.contains("photoshop:City=\"Paris\""));
        assert!(xmp.contains("Iptc4xmpCore:Location=\"Paris\""));
        assert!(xmp.contains("photoshop:DateCreated=\"2011-08\""));
        assert!(xmp.trim_end().ends_with("<?xpacket end=\"w\"?>"));
    }

    #[test]
    fn test_location_only_is_self_closing() {
        let content = SidecarContent {
            event_label: None,
            location_token: Some("Cork"),
            date: PartialDate::unknown(),
        };
        let xmp = content.to_xmp();

        assert!(!xmp.contains("dc:subject>"));
        assert!(!xmp.contains("DateCreated"));
        assert!(xmp.contains("Location=\"Cork\"/>"));
    }

    #[test]
    fn test_no_labels_writes_nothing() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("IMG_1.jpg");
        let content = SidecarContent {
            event_label: None,
            location_token: None,
            date: PartialDate::year(2011),
        };

        assert_eq!(write_sidecar(&photo, &content).unwrap(), None);
        assert!(!sidecar_path(&photo).exists());
    }

    #[test]
    fn test_existing_sidecar_untouched() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("IMG_1.jpg");
        std::fs::write(sidecar_path(&photo), b"user edits").unwrap();

        let content = SidecarContent {
            event_label: Some("Wedding"),
            location_token: None,
            date: PartialDate::unknown(),
        };
        assert_eq!(write_sidecar(&photo, &content).unwrap(), None);
        assert_eq!(std::fs::read(sidecar_path(&photo)).unwrap(), b"user edits");
    }

    #[test]
    fn test_directory_in_the_way_is_an_error() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("IMG_1.jpg");
        std::fs::create_dir(sidecar_path(&photo)).unwrap();

        let content = SidecarContent {
            event_label: Some("Wedding"),
            location_token: None,
            date: PartialDate::unknown(),
        };
        let result = write_sidecar(&photo, &content);
        assert!(matches!(result, Err(Error::Filesystem { .. })));
    }

    #[test]
    fn test_writes_new_sidecar() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("IMG_1.jpg");
        let content = SidecarContent {
            event_label: Some("Wedding"),
            location_token: None,
            date: PartialDate::unknown(),
        };

        let written = write_sidecar(&photo, &content).unwrap().unwrap();
        let xmp = std::fs::read_to_string(written).unwrap();
        assert!(xmp.contains("<rdf:li>Wedding</rdf:li>"));
    }
}
