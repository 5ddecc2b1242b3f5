//! Membership table
//!
//! The local node's view of the group: at most one [`MemberRecord`] per
//! [`NodeIdentity`], kept in insertion order. The only way to change a record
//! is through the merge and sweep primitives below, so the heartbeat stored
//! for an identity can never move backwards.

use serde::{Deserialize, Serialize};

use crate::{address::NodeIdentity, clock::Tick, message::HeartbeatEntry};

/// The local belief about one member's liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub identity: NodeIdentity,
    pub heartbeat: i64,
    pub last_updated: Tick,
}

impl MemberRecord {
    pub fn entry(&self) -> HeartbeatEntry {
        HeartbeatEntry::new(self.identity, self.heartbeat)
    }

    /// Ticks since the heartbeat was last accepted as new information.
    pub fn age(&self, now: Tick) -> Tick {
        now.saturating_sub(self.last_updated)
    }
}

/// Result of [`MembershipTable::upsert_if_newer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipTable {
    records: Vec<MemberRecord>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identity: &NodeIdentity) -> Option<&MemberRecord> {
        self.records.iter().find(|r| r.identity == *identity)
    }

    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.get(identity).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberRecord> {
        self.records.iter()
    }

    pub fn identities(&self) -> impl Iterator<Item = NodeIdentity> + '_ {
        self.records.iter().map(|r| r.identity)
    }

    fn position(&self, identity: &NodeIdentity) -> Option<usize> {
        self.records.iter().position(|r| r.identity == *identity)
    }

    /// Monotonic-max merge of a single `(identity, heartbeat)` observation.
    ///
    /// Inserts unknown identities; raises the stored heartbeat (and refreshes
    /// `last_updated`) only when `heartbeat` is strictly greater. Applying the
    /// same observation twice, or several in any order, converges to the same
    /// table.
    pub fn upsert_if_newer(&mut self, identity: NodeIdentity, heartbeat: i64, now: Tick) -> Upsert {
        match self.position(&identity) {
            Some(idx) => {
                let record = &mut self.records[idx];
                if heartbeat > record.heartbeat {
                    record.heartbeat = heartbeat;
                    record.last_updated = now;
                    Upsert::Updated
                } else {
                    Upsert::Unchanged
                }
            }
            None => {
                self.records.push(MemberRecord {
                    identity,
                    heartbeat,
                    last_updated: now,
                });
                Upsert::Inserted
            }
        }
    }

    /// Unconditionally set the local node's own record.
    ///
    /// The caller is the authority on its own heartbeat and must only pass
    /// values that never decrease.
    pub fn touch_self(&mut self, identity: NodeIdentity, heartbeat: i64, now: Tick) {
        match self.position(&identity) {
            Some(idx) => {
                let record = &mut self.records[idx];
                record.heartbeat = heartbeat;
                record.last_updated = now;
            }
            None => self.records.push(MemberRecord {
                identity,
                heartbeat,
                last_updated: now,
            }),
        }
    }

    /// Remove every record with `now - last_updated > remove_timeout`, returning
    /// the evicted records in table order.
    pub fn sweep_expired(&mut self, now: Tick, remove_timeout: Tick) -> Vec<MemberRecord> {
        let mut removed = Vec::new();
        self.records.retain(|r| {
            if r.age(now) > remove_timeout {
                removed.push(*r);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Records that have gone without news for longer than `fail_timeout`.
    pub fn stale(&self, now: Tick, fail_timeout: Tick) -> Vec<NodeIdentity> {
        self.records
            .iter()
            .filter(|r| r.age(now) > fail_timeout)
            .map(|r| r.identity)
            .collect()
    }

    pub fn snapshot(&self) -> Vec<MemberRecord> {
        self.records.clone()
    }

    /// Wire entries for an outbound JOIN_REPLY or GOSSIP.
    pub fn entries(&self) -> Vec<HeartbeatEntry> {
        self.records.iter().map(MemberRecord::entry).collect()
    }

    /// Rebuild the table from a received snapshot, stamping every record with
    /// `now`. Duplicate identities in `entries` collapse to their maximum.
    pub fn replace_with(&mut self, entries: &[HeartbeatEntry], now: Tick) {
        self.records.clear();
        for entry in entries {
            self.upsert_if_newer(entry.identity, entry.heartbeat, now);
        }
    }
}
