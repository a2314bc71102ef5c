use std::collections::HashMap;

use parking_lot::Mutex;

/// Stand-in for the NVS partition the original stack persists keys and OTA
/// resume state to (spec §9: "Persistence is abstracted behind a
/// `KeyValueStore` trait with methods `get`, `set`, `erase`"). Blobs are
/// opaque, versionless, little-endian packed bytes per spec §6; this trait
/// does not interpret them.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]);
    fn erase(&self, key: &str);
}

/// In-memory `KeyValueStore`, used by unit/integration tests and as the
/// default for short-lived demo runs. Not durable across process restarts
/// by design — spec explicitly scopes durable queueing and persistence
/// beyond the IV/NVS blobs out of this crate's concerns (spec §1 Non-goals:
/// "durable queueing across power loss").
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) {
        self.inner.lock().insert(key.to_string(), value.to_vec());
    }

    fn erase(&self, key: &str) {
        self.inner.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_erase_round_trip() {
        let store = InMemoryStore::new();
        assert!(store.get("key_info").is_none());
        store.set("key_info", &[1, 2, 3]);
        assert_eq!(store.get("key_info"), Some(vec![1, 2, 3]));
        store.erase("key_info");
        assert!(store.get("key_info").is_none());
    }
}
