use meshnow_crypto::KeyValueStore;
use serde::{Deserialize, Serialize};

/// NVS key resumable OTA state is persisted under (spec §6).
pub const NVS_KEY: &str = "upugrad_config";

/// Everything a responder needs to resume an in-progress transfer after a
/// reboot (spec §4.G "Resumability"): partition identity, the image it
/// matches, and how far it had gotten. All persisted blobs are
/// little-endian, versionless packed structures per spec §6; `bincode`
/// gives us that for free over a `serde`-derived struct.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersistedOtaState {
    pub sha256: [u8; 16],
    pub total_size: u32,
    pub written_size: u32,
    pub bitmap: Vec<u8>,
}

pub fn load(kv: &dyn KeyValueStore) -> Option<PersistedOtaState> {
    let bytes = kv.get(NVS_KEY)?;
    bincode::deserialize(&bytes).ok()
}

pub fn save(kv: &dyn KeyValueStore, state: &PersistedOtaState) {
    if let Ok(bytes) = bincode::serialize(state) {
        kv.set(NVS_KEY, &bytes);
    }
}

pub fn erase(kv: &dyn KeyValueStore) {
    kv.erase(NVS_KEY);
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnow_crypto::InMemoryStore;

    #[test]
    fn save_load_erase_round_trip() {
        let kv = InMemoryStore::new();
        assert!(load(&kv).is_none());

        let state = PersistedOtaState {
            sha256: [7; 16],
            total_size: 10_000,
            written_size: 6_000,
            bitmap: vec![0xff; 4],
        };
        save(&kv, &state);
        let restored = load(&kv).unwrap();
        assert_eq!(restored.sha256, [7; 16]);
        assert_eq!(restored.written_size, 6_000);

        erase(&kv);
        assert!(load(&kv).is_none());
    }
}
