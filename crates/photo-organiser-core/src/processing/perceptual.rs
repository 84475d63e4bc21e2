//! # Perceptual Hashing Module
//!
//! Perceptual hashing generates "fingerprints" that remain similar for visually
//! similar images, unlike cryptographic hashes where minor changes produce
//! completely different outputs. A resized, recompressed or lightly edited copy
//! of a photo lands within a few bits of the original.
//!
//! Two algorithms are provided behind the [`Fingerprinter`] trait:
//!
//! 1. Mean hash: 8×8 grayscale thumbnail, one bit per pixel above the mean
//! 2. Difference hash: 9×8 grayscale thumbnail, one bit per horizontal gradient
//!
//! ## Hamming Distance Interpretation
//!
//! The similarity between two images is measured using Hamming distance (count of differing bits):
//!
//! - 0-5: Same photo (resized, recompressed, metadata stripped)
//! - 6-10: Similar images (same subject with moderate differences)
//! - >10: Different images
//!
//! ## References
//!
//! - "Looks Like It", Neal Krawetz (average and difference hashes)

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// A 64-bit perceptual fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Calculate the Hamming distance between two fingerprints
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Check if two images are perceptually similar based on a threshold
    pub fn is_similar(&self, other: &Fingerprint, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Turns a decoded image into a fingerprint
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, img: &DynamicImage) -> Fingerprint;
}

/// Available fingerprint algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HashAlgorithm {
    /// Average hash over an 8×8 thumbnail
    #[default]
    Mean,

    /// Gradient hash over a 9×8 thumbnail
    Difference,
}

impl HashAlgorithm {
    /// Instantiate the algorithm
    pub fn fingerprinter(self) -> Box<dyn Fingerprinter> {
        match self {
            HashAlgorithm::Mean => Box::new(MeanHash),
            HashAlgorithm::Difference => Box::new(DifferenceHash),
        }
    }
}

/// Grayscale value of a pixel.
/// Grayscale formula: 0.299*R + 0.587*G + 0.114*B
#[inline]
fn luma(img: &DynamicImage, x: u32, y: u32) -> f32 {
    let pixel = img.get_pixel(x, y);
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

/// Average hash
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanHash;

impl Fingerprinter for MeanHash {
    fn fingerprint(&self, img: &DynamicImage) -> Fingerprint {
        // Triangle filtering averages neighbourhoods, so JPEG noise barely moves a pixel
        let small = img.resize_exact(8, 8, FilterType::Triangle);

        let mut pixels = [0.0f32; 64];
        for y in 0..8 {
            for x in 0..8 {
                pixels[(y as usize) * 8 + (x as usize)] = luma(&small, x, y);
            }
        }

        let mean = pixels.iter().sum::<f32>() / 64.0;

        let mut hash: u64 = 0;
        for (bit_pos, &p) in pixels.iter().enumerate() {
            if p > mean {
                hash |= 1u64 << bit_pos;
            }
        }

        Fingerprint(hash)
    }
}

/// Difference hash
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferenceHash;

impl Fingerprinter for DifferenceHash {
    fn fingerprint(&self, img: &DynamicImage) -> Fingerprint {
        let small = img.resize_exact(9, 8, FilterType::Triangle);

        let mut hash: u64 = 0;
        let mut bit_pos = 0;
        for y in 0..8 {
            for x in 0..8 {
                if luma(&small, x, y) > luma(&small, x + 1, y) {
                    hash |= 1u64 << bit_pos;
                }
                bit_pos += 1;
            }
        }

        Fingerprint(hash)
    }
}

/// Decode an image file and fingerprint it.
///
/// Returns `None` for a format no decoder is built in for, such as HEIC.
/// Such a photo is still organised, just without duplicate detection.
pub fn fingerprint_file(
    path: &Path,
    fingerprinter: &dyn Fingerprinter,
) -> Result<Option<Fingerprint>> {
    let img = match image::open(path) {
        Ok(img) => img,
        Err(image::ImageError::Unsupported(e)) => {
            debug!("No decoder for '{}': {}", path.display(), e);
            return Ok(None);
        }
        Err(image::ImageError::IoError(io)) => return Err(Error::unreadable(path, io)),
        Err(other) => {
            return Err(Error::unreadable(
                path,
                format!("cannot decode image: {}", other),
            ))
        }
    };

    if img.width() == 0 || img.height() == 0 {
        return Err(Error::unreadable(path, "image has no pixels"));
    }

    Ok(Some(fingerprinter.fingerprint(&img)))
}
