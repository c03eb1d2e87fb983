//! Key-value persistence for the history ring
//!
//! The host platform owns the real storage backend; it only needs to
//! implement [`KeyValueStore`]. An in-memory store and a directory-backed
//! store are provided for tests, the CLI and desktop hosts.

use crate::error::StressError;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Key under which the serialized history ring is stored
pub const HISTORY_KEY: &str = "stress_history";

/// Minimal string key-value store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StressError>;

    fn put(&mut self, key: &str, value: String) -> Result<(), StressError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StressError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), StressError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StressError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, StressError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StressError::StoreError(format!("invalid store key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StressError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), StressError> {
        let path = self.path_for(key)?;
        // write-then-rename so a crash never leaves a truncated history
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::history::HistoryRing;
    use crate::types::{StressLevel, StressReading};

    fn sample_ring() -> HistoryRing {
        let mut ring = HistoryRing::default();
        for i in 0..3u8 {
            ring.append(StressReading {
                timestamp: 1_700_000_000_000 + i64::from(i) * 3_600_000,
                score: 20 + i * 20,
                level: StressLevel::Medium,
                typing_speed: 5.1,
                backspace_ratio: 0.05,
                touch_pressure: 0.62,
            });
        }
        ring
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        let ring = sample_ring();
        ring.save(&mut store).unwrap();

        let loaded = HistoryRing::load(&store, HistoryConfig::default());
        assert_eq!(loaded, ring);
    }

    #[test]
    fn test_missing_key_loads_empty() {
        let store = MemoryStore::new();
        assert!(HistoryRing::load(&store, HistoryConfig::default()).is_empty());
    }

    #[test]
    fn test_corrupt_value_loads_empty() {
        let mut store = MemoryStore::new();
        store.put(HISTORY_KEY, "garbage".to_string()).unwrap();
        assert!(HistoryRing::load(&store, HistoryConfig::default()).is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);

        let ring = sample_ring();
        ring.save(&mut store).unwrap();
        assert!(dir.path().join("stress_history.json").exists());

        let reopened = FileStore::open(dir.path()).unwrap();
        let loaded = HistoryRing::load(&reopened, HistoryConfig::default());
        assert_eq!(loaded, ring);
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        assert!(store.put("../escape", "x".to_string()).is_err());
        assert!(store.get("").is_err());
    }
}
