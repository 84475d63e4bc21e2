// Hashing modules
pub mod cryptographic;
pub mod perceptual;
pub mod timeout_utils;

// Expose cryptographic hash calculations
pub use cryptographic::compute_cryptographic;

// Expose perceptual hash
pub use perceptual::{
    fingerprint_file, DifferenceHash, Fingerprint, Fingerprinter, HashAlgorithm, MeanHash,
};

pub use timeout_utils::execute_with_timeout;
