//! Embedded metadata.
//!
//! Reading: missing or malformed EXIF is the common case for scans,
//! screenshots and messenger downloads, so it is reported as `None` rather
//! than as an error. Only a file that cannot be opened at all is a per-file
//! failure.
//!
//! Writing: labels are merged into the EXIF block of a JPEG copy. The event
//! goes into `ImageDescription` and the place into `UserComment`; every other
//! primary-IFD field already present is carried over.

use chrono::NaiveDateTime;
use exif::experimental::Writer;
use exif::{Field, In, Reader, Tag, Value};
use filetime::FileTime;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Cursor, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logging::log_fs_modification;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const MARKER_SOI: u8 = 0xD8;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;

/// Read the "original capture" timestamp embedded in an image.
///
/// Looks at `DateTimeOriginal` first and falls back to `DateTime`.
pub fn read_capture_timestamp(path: &Path) -> Result<Option<NaiveDateTime>> {
    let file = File::open(path).map_err(|e| Error::unreadable(path, e))?;
    let mut buf_reader = BufReader::new(file);

    let exif = match Reader::new().read_from_container(&mut buf_reader) {
        Ok(exif) => exif,
        Err(e) => {
            // No EXIF data or unsupported container
            debug!("No readable EXIF in {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    for tag in [Tag::DateTimeOriginal, Tag::DateTime] {
        if let Some(field) = exif.get_field(tag, In::PRIMARY) {
            if let Some(raw) = field_to_string(&field.value) {
                if let Some(timestamp) = parse_exif_datetime(&raw) {
                    return Ok(Some(timestamp));
                }
                warn!(
                    "Ignoring unparseable {} '{}' in {}",
                    tag,
                    raw,
                    path.display()
                );
            }
        }
    }

    Ok(None)
}

/// Convert an ASCII EXIF value to a trimmed string
fn field_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec.first().map(|ascii_val| {
            String::from_utf8_lossy(ascii_val)
                .trim_end_matches('\0')
                .trim()
                .to_string()
        }),
        _ => None,
    }
}

/// Parse an EXIF datetime string (`YYYY:MM:DD HH:MM:SS`)
pub fn parse_exif_datetime(datetime_str: &str) -> Option<NaiveDateTime> {
    let trimmed = datetime_str.trim();

    // Cameras with an unset clock write all zeros
    if trimmed.is_empty() || trimmed.starts_with("0000") {
        return None;
    }

    ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

/// Labels to merge into a copy's EXIF block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddedLabels<'a> {
    pub event_label: Option<&'a str>,
    pub location_token: Option<&'a str>,
}

impl EmbeddedLabels<'_> {
    pub fn is_empty(&self) -> bool {
        self.event_label.is_none() && self.location_token.is_none()
    }
}

/// `UserComment` payload: 8-byte character code then the text
fn user_comment(text: &str, little_endian: bool) -> Vec<u8> {
    if text.is_ascii() {
        let mut value = b"ASCII\0\0\0".to_vec();
        value.extend_from_slice(text.as_bytes());
        return value;
    }

    let mut value = b"UNICODE\0".to_vec();
    for unit in text.encode_utf16() {
        let bytes = if little_endian {
            unit.to_le_bytes()
        } else {
            unit.to_be_bytes()
        };
        value.extend_from_slice(&bytes);
    }
    value
}

/// Read the primary-IFD fields of an existing EXIF block, if any
fn existing_fields(data: &[u8]) -> std::result::Result<(Vec<Field>, bool), exif::Error> {
    match Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif) => {
            let fields = exif
                .fields()
                .filter(|field| field.ifd_num == In::PRIMARY)
                .filter(|field| !matches!(field.value, Value::Unknown(..)))
                .cloned()
                .collect();
            Ok((fields, exif.little_endian()))
        }
        Err(exif::Error::NotFound(_)) => Ok((Vec::new(), false)),
        Err(e) => Err(e),
    }
}

/// Serialize `fields` with the labels replacing any previous values
fn merged_exif(
    mut fields: Vec<Field>,
    little_endian: bool,
    labels: &EmbeddedLabels<'_>,
) -> std::result::Result<Vec<u8>, exif::Error> {
    if let Some(event) = labels.event_label {
        fields.retain(|field| field.tag != Tag::ImageDescription);
        fields.push(Field {
            tag: Tag::ImageDescription,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![event.as_bytes().to_vec()]),
        });
    }
    if let Some(location) = labels.location_token {
        fields.retain(|field| field.tag != Tag::UserComment);
        fields.push(Field {
            tag: Tag::UserComment,
            ifd_num: In::PRIMARY,
            value: Value::Undefined(user_comment(location, little_endian), 0),
        });
    }

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }

    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, little_endian)?;
    Ok(buf.into_inner())
}

/// Rebuild a JPEG with `tiff` as its only EXIF segment.
///
/// The new APP1 goes after a leading JFIF APP0, or straight after SOI.
/// Everything from the start-of-scan marker on is kept byte for byte.
fn splice_exif_segment(jpeg: &[u8], tiff: &[u8]) -> std::result::Result<Vec<u8>, String> {
    if jpeg.len() < 4 || jpeg[0] != 0xFF || jpeg[1] != MARKER_SOI {
        return Err("not a JPEG stream".to_string());
    }

    let segment_len = 2 + EXIF_HEADER.len() + tiff.len();
    if segment_len > u16::MAX as usize {
        return Err(format!("EXIF block too large ({} bytes)", tiff.len()));
    }

    let mut app1 = Vec::with_capacity(segment_len + 2);
    app1.extend_from_slice(&[0xFF, MARKER_APP1]);
    app1.extend_from_slice(&(segment_len as u16).to_be_bytes());
    app1.extend_from_slice(EXIF_HEADER);
    app1.extend_from_slice(tiff);

    let mut kept: Vec<&[u8]> = Vec::new();
    let mut pos = 2;
    loop {
        if pos + 1 >= jpeg.len() || jpeg[pos] != 0xFF {
            return Err("truncated JPEG header".to_string());
        }
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // Fill byte
            pos += 1;
            continue;
        }
        if marker == MARKER_SOS || marker == MARKER_EOI {
            break;
        }
        if pos + 4 > jpeg.len() {
            return Err("truncated JPEG segment".to_string());
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return Err("truncated JPEG segment".to_string());
        }

        let segment = &jpeg[pos..end];
        let is_exif = marker == MARKER_APP1 && segment[4..].starts_with(EXIF_HEADER);
        if !is_exif {
            kept.push(segment);
        }
        pos = end;
    }

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]);

    let mut segments = kept.into_iter().peekable();
    if let Some(app0) = segments.next_if(|segment| segment[1] == MARKER_APP0) {
        out.extend_from_slice(app0);
    }
    out.extend_from_slice(&app1);
    for segment in segments {
        out.extend_from_slice(segment);
    }
    out.extend_from_slice(&jpeg[pos..]);
    Ok(out)
}

/// Merge `labels` into the EXIF block of the JPEG at `path`.
///
/// The file is rewritten through a scratch file and a rename, and keeps its
/// modification time. Returns false when there was nothing to write.
pub fn embed_labels(path: &Path, labels: &EmbeddedLabels<'_>) -> Result<bool> {
    if labels.is_empty() {
        return Ok(false);
    }

    let original = fs::read(path).map_err(|e| Error::filesystem(path, e))?;
    let mtime = fs::metadata(path)
        .map(|meta| FileTime::from_last_modification_time(&meta))
        .map_err(|e| Error::filesystem(path, e))?;

    let (fields, little_endian) =
        existing_fields(&original).map_err(|e| Error::metadata(path, e))?;
    let tiff = merged_exif(fields, little_endian, labels).map_err(|e| Error::metadata(path, e))?;
    let rewritten = splice_exif_segment(&original, &tiff).map_err(|e| Error::metadata(path, e))?;

    let scratch = scratch_path(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&scratch)
        .map_err(|e| Error::filesystem(&scratch, e))?;
    let written = file.write_all(&rewritten).and_then(|_| file.sync_all());
    drop(file);

    if let Err(e) = written.and_then(|_| fs::rename(&scratch, path)) {
        // The copy itself is untouched; only the scratch file is removed
        if let Err(remove_err) = fs::remove_file(&scratch) {
            warn!("Could not remove '{}': {}", scratch.display(), remove_err);
        }
        return Err(Error::filesystem(path, e));
    }

    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        warn!(
            "Could not restore modification time on '{}': {}",
            path.display(),
            e
        );
    }

    log_fs_modification("embed_labels", path, None);
    Ok(true)
}

/// `IMG_1.jpg` -> `.IMG_1.jpg.photo-organiser-tmp` in the same folder
fn scratch_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.photo-organiser-tmp", name))
}
