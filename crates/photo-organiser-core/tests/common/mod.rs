#![allow(dead_code)]

use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, Rgb, RgbImage};
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A 128×128 test card made of 16px cells switched on and off by `seed`.
///
/// Cards with different seeds land far apart in fingerprint space; the same
/// card re-encoded or resized stays close.
pub fn card(seed: u32) -> RgbImage {
    RgbImage::from_fn(128, 128, |x, y| {
        let cell = (y / 16) * 8 + (x / 16);
        let mixed = (cell.wrapping_add(1))
            .wrapping_mul(2_654_435_761)
            .wrapping_add(seed.wrapping_mul(40_503))
            .rotate_left(seed % 13 + 3);
        let on = (mixed >> 16) & 1 == 1;
        let level = if on { 220 } else { 30 };
        Rgb([level, level, level])
    })
}

/// TIFF-structured EXIF block holding `DateTimeOriginal`
fn exif_block(datetime: &str) -> Vec<u8> {
    let field = Field {
        tag: Tag::DateTimeOriginal,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![datetime.as_bytes().to_vec()]),
    };
    let mut writer = Writer::new();
    writer.push_field(&field);

    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).unwrap();
    buf.into_inner()
}

/// Encode `img` as JPEG, optionally with an APP1 EXIF segment right after SOI
pub fn jpeg_bytes(img: &RgbImage, quality: u8, exif_datetime: Option<&str>) -> Vec<u8> {
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .unwrap();

    let Some(datetime) = exif_datetime else {
        return encoded;
    };

    let tiff = exif_block(datetime);
    let segment_len = (2 + 6 + tiff.len()) as u16;

    let mut out = Vec::with_capacity(encoded.len() + tiff.len() + 10);
    out.extend_from_slice(&encoded[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&encoded[2..]);
    out
}

/// Write a JPEG test photo, creating parent directories
pub fn write_jpeg(path: &Path, img: &RgbImage, quality: u8, exif_datetime: Option<&str>) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, jpeg_bytes(img, quality, exif_datetime)).unwrap();
    path.to_path_buf()
}

/// Write a PNG test photo, creating parent directories
pub fn write_png(path: &Path, img: &RgbImage) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    img.save(path).unwrap();
    path.to_path_buf()
}

/// The same card, scaled down and saved at a lower JPEG quality
pub fn recompressed_copy(img: &RgbImage) -> RgbImage {
    DynamicImage::ImageRgb8(img.clone())
        .resize_exact(96, 96, FilterType::Lanczos3)
        .to_rgb8()
}

/// Write bytes that carry an image extension but cannot be decoded
pub fn write_corrupt(path: &Path) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"\xFF\xD8 this is not really a jpeg").unwrap();
    path.to_path_buf()
}

/// Every file under `root` with its BLAKE3 hash
pub fn hash_tree(root: &Path) -> BTreeMap<PathBuf, blake3::Hash> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let bytes = fs::read(entry.path()).unwrap();
            (entry.path().to_path_buf(), blake3::hash(&bytes))
        })
        .collect()
}

/// Files under `root`, relative to it, with `/` separators
pub fn relative_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}

/// Parse a report file back into JSON
pub fn read_report(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// An EXIF field of `path` as raw bytes (ASCII text or undefined payload)
pub fn exif_field_bytes(path: &Path, tag: Tag) -> Option<Vec<u8>> {
    let mut reader = std::io::BufReader::new(fs::File::open(path).unwrap());
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts.first().cloned(),
        Value::Undefined(bytes, _) => Some(bytes.clone()),
        _ => None,
    }
}
