//! Durable Storage Module
//!
//! String-keyed, string-valued slots backing the persistent store. One slot
//! holds one serialized entry; there is no atomicity across slots.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::StorageError;

/// File extension of each slot written by `FileStorage`.
const SLOT_EXTENSION: &str = "json";

// == Durable Storage Trait ==
/// Key-scoped durable storage.
pub trait DurableStorage: Send + Sync {
    /// Reads a slot. `Ok(None)` when the slot does not exist.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a slot, replacing any previous contents.
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a slot, returning whether it existed.
    fn remove_item(&mut self, key: &str) -> Result<bool, StorageError>;

    /// Lists every slot name.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

impl<S: DurableStorage + ?Sized> DurableStorage for Box<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&mut self, key: &str) -> Result<bool, StorageError> {
        (**self).remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

// == File Storage ==
/// Stores each slot as a JSON file in one directory.
///
/// Slot names are escaped into file names so no key can address a path
/// outside the directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Directory where slot files are stored
    dir: PathBuf,
}

impl FileStorage {
    /// Uses the platform cache directory (`~/.cache/drr_cache/` on Linux).
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "drr_cache")?;
        Some(Self::with_dir(project_dirs.cache_dir()))
    }

    /// Uses a specific directory, created lazily on first write.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", encode_slot_name(key), SLOT_EXTENSION)))
    }
}

impl DurableStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.slot_path(key)?) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut keys = Vec::new();
        for item in read_dir {
            let path = item?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(decode_slot_name)
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

// == In-Memory Storage ==
/// Slots kept in a HashMap; lost on restart.
///
/// Used in tests and when no cache directory is available. An optional byte
/// quota mimics browser-style storage limits.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    slots: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects writes that would push the total stored bytes past `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            slots: HashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Inserts raw slot contents, bypassing the quota.
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.slots.insert(key.into(), value.into());
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.slots
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl DurableStorage for InMemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            let needed = self.used_bytes_without(key) + key.len() + value.len();
            if needed > quota {
                return Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    format!("quota exceeded: {needed} > {quota} bytes"),
                )));
            }
        }
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.slots.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.slots.keys().cloned().collect())
    }
}

// == Slot Name Encoding ==
/// Escapes every byte outside `[A-Za-z0-9_-]` as `%XX`.
fn encode_slot_name(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn decode_slot_name(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}
