use std::fs;
use std::path::PathBuf;

use meshnow_crypto::KeyValueStore;

/// File-backed `KeyValueStore`, the demo binary's stand-in for NVS (spec §9:
/// "model NVS as a small trait"). Grounded on `datadir.rs`'s one-file-per-key
/// layout under a base directory, created on open the same way `DataDir::open`
/// creates its home directory if missing.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn open(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &[u8]) {
        let _ = fs::write(self.path_for(key), value);
    }

    fn erase(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("meshnow-filestore-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn set_get_erase_round_trip_on_disk() {
        let dir = scratch_dir("round-trip");
        let store = FileStore::open(&dir).unwrap();
        assert!(store.get("upugrad_config").is_none());
        store.set("upugrad_config", &[1, 2, 3]);
        assert_eq!(store.get("upugrad_config"), Some(vec![1, 2, 3]));
        store.erase("upugrad_config");
        assert!(store.get("upugrad_config").is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn a_fresh_store_over_the_same_directory_sees_prior_writes() {
        let dir = scratch_dir("reopen");
        {
            let store = FileStore::open(&dir).unwrap();
            store.set("key", b"persisted");
        }
        let reopened = FileStore::open(&dir).unwrap();
        assert_eq!(reopened.get("key"), Some(b"persisted".to_vec()));
        let _ = fs::remove_dir_all(&dir);
    }
}
