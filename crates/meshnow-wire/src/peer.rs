use std::collections::HashMap;

use parking_lot::RwLock as PlRwLock;

use crate::mac::Mac;

/// A known unicast peer and its optional Local Master Key (LMK), spec §3.
#[derive(Clone, Copy, Debug)]
pub struct Peer {
    pub addr: Mac,
    pub lmk: Option<[u8; 16]>,
}

/// Peer table (spec §4.B). `add_peer`/`del_peer` are idempotent; the
/// broadcast peer is present from construction and can never be removed.
pub struct PeerTable {
    peers: PlRwLock<HashMap<Mac, Peer>>,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        let mut peers = HashMap::new();
        peers.insert(
            Mac::BROADCAST,
            Peer {
                addr: Mac::BROADCAST,
                lmk: None,
            },
        );
        Self {
            peers: PlRwLock::new(peers),
        }
    }

    /// Idempotent: a second call with the same address is a no-op that
    /// leaves the existing LMK (if any) untouched.
    pub fn add_peer(&self, addr: Mac, lmk: Option<[u8; 16]>) {
        let mut peers = self.peers.write();
        peers.entry(addr).or_insert(Peer { addr, lmk });
    }

    /// Idempotent; refuses to remove the broadcast peer.
    pub fn del_peer(&self, addr: Mac) {
        if addr.is_broadcast() {
            return;
        }
        self.peers.write().remove(&addr);
    }

    pub fn contains(&self, addr: Mac) -> bool {
        self.peers.read().contains_key(&addr)
    }

    pub fn get(&self, addr: Mac) -> Option<Peer> {
        self.peers.read().get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_peer_present_at_construction_and_undeletable() {
        let table = PeerTable::new();
        assert!(table.contains(Mac::BROADCAST));
        table.del_peer(Mac::BROADCAST);
        assert!(table.contains(Mac::BROADCAST));
    }

    #[test]
    fn add_and_del_peer_are_idempotent() {
        let table = PeerTable::new();
        let addr = Mac::new([1, 2, 3, 4, 5, 6]);
        table.add_peer(addr, Some([0xaa; 16]));
        table.add_peer(addr, None); // no-op, must not clobber the LMK
        assert_eq!(table.get(addr).unwrap().lmk, Some([0xaa; 16]));

        table.del_peer(addr);
        table.del_peer(addr); // idempotent
        assert!(!table.contains(addr));
    }
}
