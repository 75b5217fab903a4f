//! File-backed store of pinned host keys, one JSON file per short name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use russh::keys::PublicKey;

use super::record::{HostKeyRecord, encode_key, fingerprint};
use crate::error::HostKeyError;
use crate::host::HostAddress;

const EXTENSION: &str = "hostkey";
const BACKUP_SUFFIX: &str = ".backup";

/// Store of pinned host keys rooted at a directory.
///
/// Files are not locked; concurrent processes working on the same short
/// name can race.
#[derive(Debug, Clone)]
pub struct HostKeyStore {
    dir: PathBuf,
}

impl Default for HostKeyStore {
    fn default() -> Self {
        Self::new(".")
    }
}

impl HostKeyStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `short_name`.
    pub fn path(&self, short_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", short_name, EXTENSION))
    }

    /// Path of the backup for `short_name`.
    pub fn backup_path(&self, short_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", short_name, EXTENSION, BACKUP_SUFFIX))
    }

    /// Whether a record exists for `short_name`.
    pub fn exists(&self, short_name: &str) -> bool {
        self.path(short_name).is_file()
    }

    /// Pin `key` for `host`, replacing any existing record.
    ///
    /// The record is filed under the short name of `host` and keeps `host`
    /// as typed.
    pub fn capture(&self, host: &str, key: &PublicKey) -> Result<HostKeyRecord, HostKeyError> {
        let short_name = HostAddress::parse(host).short_name;
        let path = self.path(&short_name);
        let record = HostKeyRecord::new(host, key)?;

        let data = serde_json::to_vec_pretty(&record)
            .map_err(|e| HostKeyError::Encode(e.to_string()))?;

        debug!(
            "saving host key to {} ({} {})",
            path.display(),
            record.algorithm,
            record.fingerprint
        );
        write_private(&path, &data).map_err(|source| HostKeyError::Io {
            path: path.clone(),
            source,
        })?;

        info!(
            "host key saved for {}: {} {} ({})",
            host,
            record.algorithm,
            record.fingerprint,
            path.display()
        );
        Ok(record)
    }

    /// Read the full record for `short_name`.
    pub fn load_record(&self, short_name: &str) -> Result<HostKeyRecord, HostKeyError> {
        let path = self.path(short_name);
        let data = fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => HostKeyError::NotFound { path: path.clone() },
            _ => HostKeyError::Io {
                path: path.clone(),
                source,
            },
        })?;

        serde_json::from_slice(&data).map_err(|e| HostKeyError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    /// Load the stored key and its raw bytes.
    fn load_raw(&self, short_name: &str) -> Result<(Vec<u8>, PublicKey), HostKeyError> {
        let record = self.load_record(short_name)?;
        let loaded = record.decode_key().map_err(|reason| HostKeyError::Corrupt {
            path: self.path(short_name),
            reason,
        })?;
        debug!(
            "host key loaded for {} ({} {})",
            short_name, record.algorithm, record.fingerprint
        );
        Ok(loaded)
    }

    /// Load the pinned key for `short_name`.
    pub fn load(&self, short_name: &str) -> Result<PublicKey, HostKeyError> {
        self.load_raw(short_name).map(|(_, key)| key)
    }

    /// Check `candidate` against the pinned key.
    ///
    /// Raw key bytes are compared; the stored fingerprint field is ignored.
    pub fn verify(&self, short_name: &str, candidate: &PublicKey) -> Result<(), HostKeyError> {
        let (stored, _) = self.load_raw(short_name)?;
        let presented = encode_key(candidate)?;

        if stored != presented {
            return Err(HostKeyError::Mismatch {
                host: short_name.to_string(),
                stored: fingerprint(&stored),
                presented: fingerprint(&presented),
            });
        }
        Ok(())
    }

    /// Remove the record for `short_name`. Missing records are an error.
    pub fn delete(&self, short_name: &str) -> Result<(), HostKeyError> {
        let path = self.require(short_name)?;
        fs::remove_file(&path).map_err(|source| HostKeyError::Io {
            path: path.clone(),
            source,
        })?;
        info!("host key deleted for {} ({})", short_name, path.display());
        Ok(())
    }

    /// Copy the record to its `.backup` sibling, replacing any prior backup.
    pub fn backup(&self, short_name: &str) -> Result<PathBuf, HostKeyError> {
        let path = self.require(short_name)?;
        let backup = self.backup_path(short_name);
        fs::copy(&path, &backup).map_err(|source| HostKeyError::Io {
            path: backup.clone(),
            source,
        })?;
        info!("host key for {} backed up to {}", short_name, backup.display());
        Ok(backup)
    }

    /// Put the backup back in place of the record.
    pub fn restore(&self, short_name: &str) -> Result<(), HostKeyError> {
        let backup = self.backup_path(short_name);
        if !backup.is_file() {
            return Err(HostKeyError::NotFound { path: backup });
        }
        let path = self.path(short_name);
        fs::copy(&backup, &path).map_err(|source| HostKeyError::Io {
            path: path.clone(),
            source,
        })?;
        info!("host key for {} restored from {}", short_name, backup.display());
        Ok(())
    }

    fn require(&self, short_name: &str) -> Result<PathBuf, HostKeyError> {
        let path = self.path(short_name);
        if !path.is_file() {
            return Err(HostKeyError::NotFound { path });
        }
        Ok(path)
    }
}

/// Write `data` to `path` with owner-only permissions.
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    io::Write::write_all(&mut file, data)?;

    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
