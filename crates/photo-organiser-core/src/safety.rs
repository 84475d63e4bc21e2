use filetime::FileTime;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::{log_file_error, log_fs_modification};
use crate::processing::compute_cryptographic;

/// Source and destination roots after setup checks, both canonical
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedRoots {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl CheckedRoots {
    /// Destination root when it sits inside the source tree and must be skipped by the scan
    pub fn nested_destination(&self) -> Option<&Path> {
        if self.destination.starts_with(&self.source) {
            Some(&self.destination)
        } else {
            None
        }
    }
}

/// Guards every write the organiser makes.
///
/// The source tree is only ever opened for reading. Destination files are
/// created with `create_new`, so an existing file is never replaced.
pub struct SafetyManager {
    verify_copies: bool,
    preserve_timestamps: bool,
}

impl SafetyManager {
    /// Create a new SafetyManager with the provided configuration
    pub fn new(config: &Config) -> Self {
        Self {
            verify_copies: config.verify_copies,
            preserve_timestamps: config.preserve_timestamps,
        }
    }

    /// Validate both roots before anything is scanned or copied.
    ///
    /// Creates the destination root if needed and proves it is writable.
    pub fn check_roots(&self, source_root: &Path, destination_root: &Path) -> Result<CheckedRoots> {
        if !source_root.exists() {
            return Err(Error::FileNotFound(source_root.to_path_buf()));
        }
        if !source_root.is_dir() {
            return Err(Error::Configuration(format!(
                "Source root is not a directory: {}",
                source_root.display()
            )));
        }
        let source = source_root
            .canonicalize()
            .map_err(|e| Error::filesystem(source_root, e))?;

        if destination_root.exists() && !destination_root.is_dir() {
            return Err(Error::filesystem(
                destination_root,
                io::Error::new(io::ErrorKind::Other, "destination exists and is not a directory"),
            ));
        }

        if !destination_root.exists() {
            fs::create_dir_all(destination_root)
                .map_err(|e| Error::filesystem(destination_root, e))?;
            log_fs_modification("create_dir", destination_root, Some("destination root"));
        }

        let destination = destination_root
            .canonicalize()
            .map_err(|e| Error::filesystem(destination_root, e))?;

        if destination == source {
            return Err(Error::SafetyCheck(format!(
                "Destination must differ from the source: {}",
                source.display()
            )));
        }

        Self::probe_writable(&destination)?;

        debug!(
            "Roots checked: source '{}', destination '{}'",
            source.display(),
            destination.display()
        );

        Ok(CheckedRoots {
            source,
            destination,
        })
    }

    /// Create and remove a scratch file to prove the directory accepts writes
    fn probe_writable(dir: &Path) -> Result<()> {
        let probe = dir.join(format!(".photo-organiser-probe-{}", std::process::id()));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .map_err(|e| Error::filesystem(dir, e))?;
        let written = file.write_all(b"probe");
        drop(file);

        let removed = fs::remove_file(&probe);
        written.map_err(|e| Error::filesystem(dir, e))?;
        removed.map_err(|e| Error::filesystem(&probe, e))?;
        Ok(())
    }

    /// Copy `source` to a destination path that must not exist yet.
    ///
    /// Missing parent directories are created. The copy is synced, checked for
    /// size and, when enabled, re-hashed against the source. On failure only
    /// the file created by this call is removed. Returns the bytes copied.
    pub fn copy_photo(&self, source: &Path, destination: &Path) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
                log_fs_modification("create_dir", parent, None);
            }
        }

        let mut input = File::open(source).map_err(|e| Error::filesystem(source, e))?;
        let source_meta = input
            .metadata()
            .map_err(|e| Error::filesystem(source, e))?;

        // Fails with AlreadyExists rather than replacing anything
        let mut output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| Error::filesystem(destination, e))?;

        let written = Self::write_all_synced(&mut input, &mut output);
        drop(output);

        let copied = written
            .map_err(|e| Error::filesystem(destination, e))
            .and_then(|bytes| {
                self.verify(source, destination, source_meta.len())?;
                Ok(bytes)
            });

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                log_file_error(destination, "copy", &e);
                match fs::remove_file(destination) {
                    Ok(()) => log_fs_modification("remove", destination, Some("partial copy")),
                    Err(remove_err) => log_file_error(destination, "remove partial copy", &remove_err),
                }
                return Err(e);
            }
        };

        if self.preserve_timestamps {
            let mtime = FileTime::from_last_modification_time(&source_meta);
            if let Err(e) = filetime::set_file_mtime(destination, mtime) {
                warn!(
                    "Could not preserve modification time on '{}': {}",
                    destination.display(),
                    e
                );
            }
        }

        log_fs_modification(
            "copy",
            destination,
            Some(&format!("from {} ({} bytes)", source.display(), bytes)),
        );
        Ok(bytes)
    }

    fn write_all_synced(input: &mut File, output: &mut File) -> io::Result<u64> {
        let bytes = io::copy(input, output)?;
        output.sync_all()?;
        Ok(bytes)
    }

    /// Read-back verification of a finished copy
    fn verify(&self, source: &Path, destination: &Path, expected_len: u64) -> Result<()> {
        let actual_len = fs::metadata(destination)
            .map_err(|e| Error::filesystem(destination, e))?
            .len();
        if actual_len != expected_len {
            return Err(Error::SafetyCheck(format!(
                "Size mismatch after copying to {} ({} vs {} bytes)",
                destination.display(),
                actual_len,
                expected_len
            )));
        }

        if self.verify_copies {
            let source_hash = compute_cryptographic(source)?;
            let destination_hash = compute_cryptographic(destination)?;
            if source_hash != destination_hash {
                return Err(Error::SafetyCheck(format!(
                    "Content hash mismatch after copying to {}",
                    destination.display()
                )));
            }
        }

        Ok(())
    }
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager() -> SafetyManager {
        SafetyManager::new(&Config::default())
    }

    #[test]
    fn test_check_roots_creates_destination() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir(&source).unwrap();
        let destination = dir.path().join("out").join("library");

        let roots = manager().check_roots(&source, &destination).unwrap();
        assert!(destination.is_dir());
        assert_eq!(roots.destination, destination.canonicalize().unwrap());
        assert!(roots.nested_destination().is_none());

        // The probe file is cleaned up
        assert_eq!(fs::read_dir(&destination).unwrap().count(), 0);
    }

    #[test]
    fn test_same_root_rejected() {
        let dir = tempdir().unwrap();
        let result = manager().check_roots(dir.path(), dir.path());
        assert!(matches!(result, Err(Error::SafetyCheck(_))));
    }

    #[test]
    fn test_destination_inside_source_is_reported() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("organised");

        let roots = manager().check_roots(dir.path(), &destination).unwrap();
        assert_eq!(roots.nested_destination(), Some(roots.destination.as_path()));
    }

    #[test]
    fn test_missing_source_rejected() {
        let dir = tempdir().unwrap();
        let result = manager().check_roots(&dir.path().join("nope"), &dir.path().join("out"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_destination_that_is_a_file_rejected() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir(&source).unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let result = manager().check_roots(&source, &file);
        assert!(matches!(result, Err(Error::Filesystem { .. })));
    }

    #[test]
    fn test_copy_creates_parents_and_preserves_mtime() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("IMG_1.jpg");
        fs::write(&source, vec![42u8; 4096]).unwrap();
        let old = FileTime::from_unix_time(1_300_000_000, 0);
        filetime::set_file_mtime(&source, old).unwrap();

        let destination = dir.path().join("out/2011/08/IMG_1.jpg");
        let bytes = manager().copy_photo(&source, &destination).unwrap();

        assert_eq!(bytes, 4096);
        assert_eq!(fs::read(&destination).unwrap(), fs::read(&source).unwrap());
        let meta = fs::metadata(&destination).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_copy_never_overwrites() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("new.jpg");
        let destination = dir.path().join("existing.jpg");
        fs::write(&source, b"new bytes").unwrap();
        fs::write(&destination, b"precious").unwrap();

        let result = manager().copy_photo(&source, &destination);
        assert!(matches!(result, Err(Error::Filesystem { .. })));
        assert_eq!(fs::read(&destination).unwrap(), b"precious");
    }

    #[test]
    fn test_copy_of_missing_source_leaves_nothing() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("out.jpg");

        let result = manager().copy_photo(&dir.path().join("gone.jpg"), &destination);
        assert!(result.is_err());
        assert!(!destination.exists());
    }
}
