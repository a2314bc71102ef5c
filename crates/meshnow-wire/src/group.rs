use std::collections::HashSet;

use parking_lot::RwLock as PlRwLock;

use crate::mac::Mac;

pub type GroupId = Mac;

/// Upper bound on simultaneous group memberships per node (spec §4.B: "up
/// to GROUP_MAX 6-byte IDs"). Not specified numerically upstream; recorded
/// as an Open Question resolution in DESIGN.md.
pub const GROUP_MAX: usize = 16;

/// Parsed form of a `GROUP` packet payload: `group_id || count:u8 ||
/// addrs[count*6]`. A single broadcast address in the address list means
/// "every node", mirroring spec §4.B's `set_group` semantics.
pub struct GroupUpdate {
    pub group_id: GroupId,
    pub addrs: Vec<Mac>,
    pub enable: bool,
}

impl GroupUpdate {
    /// Encodes the payload carried by a `GROUP` type frame. `enable` is not
    /// itself on the wire (original protocol infers add/remove from whether
    /// the node is already a member and re-sends), but callers in this
    /// crate's API keep it explicit for clarity; see `meshnow-transport`'s
    /// `set_group` for how it is actually applied locally before sending.
    pub fn encode(group_id: GroupId, addrs: &[Mac]) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + 1 + addrs.len() * 6);
        out.extend_from_slice(group_id.as_bytes());
        out.push(addrs.len() as u8);
        for a in addrs {
            out.extend_from_slice(a.as_bytes());
        }
        out
    }

    pub fn decode(payload: &[u8]) -> Option<(GroupId, Vec<Mac>)> {
        if payload.len() < 7 {
            return None;
        }
        let mut gid = [0u8; 6];
        gid.copy_from_slice(&payload[0..6]);
        let count = payload[6] as usize;
        let needed = 7 + count * 6;
        if payload.len() < needed {
            return None;
        }
        let mut addrs = Vec::with_capacity(count);
        for i in 0..count {
            let off = 7 + i * 6;
            let mut a = [0u8; 6];
            a.copy_from_slice(&payload[off..off + 6]);
            addrs.push(Mac::new(a));
        }
        Some((Mac::new(gid), addrs))
    }

    /// True if the address list names `me` explicitly, or is the single
    /// broadcast address meaning "all nodes".
    pub fn targets(addrs: &[Mac], me: Mac) -> bool {
        if addrs.len() == 1 && addrs[0].is_broadcast() {
            return true;
        }
        addrs.contains(&me)
    }
}

/// Local group membership set, spec §3/§4.B.
pub struct GroupTable {
    groups: PlRwLock<HashSet<GroupId>>,
}

impl Default for GroupTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTable {
    pub fn new() -> Self {
        Self {
            groups: PlRwLock::new(HashSet::new()),
        }
    }

    pub fn is_my_group(&self, id: GroupId) -> bool {
        self.groups.read().contains(&id)
    }

    /// Returns `false` without mutating if the table is already at
    /// [`GROUP_MAX`] and `id` is new.
    pub fn join(&self, id: GroupId) -> bool {
        let mut groups = self.groups.write();
        if groups.contains(&id) {
            return true;
        }
        if groups.len() >= GROUP_MAX {
            return false;
        }
        groups.insert(id);
        true
    }

    pub fn leave(&self, id: GroupId) {
        self.groups.write().remove(&id);
    }

    pub fn memberships(&self) -> Vec<GroupId> {
        self.groups.read().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_update_round_trips() {
        let gid = crate::mac::GROUP_OTA;
        let addrs = vec![Mac::new([1; 6]), Mac::new([2; 6])];
        let payload = GroupUpdate::encode(gid, &addrs);
        let (decoded_gid, decoded_addrs) = GroupUpdate::decode(&payload).unwrap();
        assert_eq!(decoded_gid, gid);
        assert_eq!(decoded_addrs, addrs);
    }

    #[test]
    fn broadcast_address_means_everyone() {
        assert!(GroupUpdate::targets(&[Mac::BROADCAST], Mac::new([9; 6])));
        assert!(!GroupUpdate::targets(&[Mac::new([1; 6])], Mac::new([9; 6])));
        assert!(GroupUpdate::targets(&[Mac::new([1; 6]), Mac::new([9; 6])], Mac::new([9; 6])));
    }

    #[test]
    fn is_my_group_linear_scan() {
        let table = GroupTable::new();
        let gid = Mac::new([5; 6]);
        assert!(!table.is_my_group(gid));
        assert!(table.join(gid));
        assert!(table.is_my_group(gid));
        table.leave(gid);
        assert!(!table.is_my_group(gid));
    }

    #[test]
    fn join_respects_group_max() {
        let table = GroupTable::new();
        for i in 0..GROUP_MAX {
            assert!(table.join(Mac::new([i as u8; 6])));
        }
        assert!(!table.join(Mac::new([200; 6])));
    }
}
