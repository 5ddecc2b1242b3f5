//! Membership protocol engine
//!
//! One [`MembershipNode`] per process (or per simulated actor). The node is
//! single-threaded: inbound payloads are queued by [`MembershipNode::receive`]
//! and processed by [`MembershipNode::node_loop`], which then runs the periodic
//! tick. Nothing in here blocks or retries.
//!
//! ```text
//! Uninitialized --init--> Joining --bootstrap (seed)--> InGroup
//!                            |                            ^
//!                            +--JOIN_REPLY----------------+
//! any --fail--> Failed          any --shutdown--> Stopped
//! ```

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use bytes::Bytes;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing as log;

use crate::{
    address::NodeIdentity,
    clock::Tick,
    config::ProtocolConfig,
    error::{ProtocolError, ProtocolResult, TransportError},
    message::{HeartbeatEntry, Message, MessageKind},
    metrics,
    observer::{MembershipObserver, TracingObserver},
    sampling::sample_peers,
    table::{MembershipTable, Upsert},
    transport::Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Uninitialized,
    Joining,
    InGroup,
    Failed,
    Stopped,
}

/// Mutable protocol state of a node; reset on `init` and `shutdown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRuntimeState {
    pub self_heartbeat: i64,
    pub failed: bool,
    pub in_group: bool,
    pub fail_timeout: Tick,
    pub remove_timeout: Tick,
    /// Ticks until the next gossip round; `None` while not gossiping.
    pub gossip_countdown: Option<Tick>,
    pub table: MembershipTable,
    /// Last heartbeat and removal tick of recently evicted members.
    pub tombstones: HashMap<NodeIdentity, Tombstone>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub heartbeat: i64,
    pub removed_at: Tick,
}

impl NodeRuntimeState {
    fn initial(config: &ProtocolConfig) -> Self {
        Self {
            self_heartbeat: 0,
            failed: false,
            in_group: false,
            fail_timeout: config.fail_timeout_ticks,
            remove_timeout: config.remove_timeout_ticks,
            gossip_countdown: None,
            table: MembershipTable::new(),
            tombstones: HashMap::new(),
        }
    }
}

/// What one call to [`MembershipNode::on_tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub removed: Vec<NodeIdentity>,
    /// Peers a GOSSIP was successfully handed to this tick.
    pub gossiped_to: Vec<NodeIdentity>,
}

pub struct MembershipNode<T: Transport> {
    identity: NodeIdentity,
    bootstrap: NodeIdentity,
    config: ProtocolConfig,
    status: NodeStatus,
    state: NodeRuntimeState,
    inbox: VecDeque<Bytes>,
    transport: T,
    observer: Arc<dyn MembershipObserver>,
    rng: StdRng,
}

impl<T: Transport> std::fmt::Debug for MembershipNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipNode")
            .field("identity", &self.identity)
            .field("status", &self.status)
            .field("state", &self.state)
            .field("inbox", &self.inbox.len())
            .finish()
    }
}

impl<T: Transport> MembershipNode<T> {
    pub fn new(
        identity: NodeIdentity,
        bootstrap: NodeIdentity,
        transport: T,
        config: ProtocolConfig,
    ) -> ProtocolResult<Self> {
        config.validate()?;
        let seed = (u64::from(identity.host_id) << 16) | u64::from(identity.port);
        Ok(Self {
            identity,
            bootstrap,
            state: NodeRuntimeState::initial(&config),
            config,
            status: NodeStatus::Uninitialized,
            inbox: VecDeque::new(),
            transport,
            observer: Arc::new(TracingObserver),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn MembershipObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Random source for partial fan-out; defaults to a generator seeded from
    /// the node identity.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn is_in_group(&self) -> bool {
        self.state.in_group
    }

    pub fn is_failed(&self) -> bool {
        self.state.failed
    }

    pub fn self_heartbeat(&self) -> i64 {
        self.state.self_heartbeat
    }

    pub fn runtime(&self) -> &NodeRuntimeState {
        &self.state
    }

    pub fn table(&self) -> &MembershipTable {
        &self.state.table
    }

    pub fn members(&self) -> Vec<NodeIdentity> {
        self.state.table.identities().collect()
    }

    /// Members silent for longer than the fail timeout but not yet removed.
    pub fn stale_members(&self, now: Tick) -> Vec<NodeIdentity> {
        self.state.table.stale(now, self.state.fail_timeout)
    }

    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }

    fn is_seed(&self) -> bool {
        self.identity == self.bootstrap
    }

    fn accepts_traffic(&self) -> bool {
        matches!(self.status, NodeStatus::Joining | NodeStatus::InGroup)
    }

    /// Reset all runtime state and enter `Joining`.
    pub fn init(&mut self) {
        self.state = NodeRuntimeState::initial(&self.config);
        self.inbox.clear();
        self.status = NodeStatus::Joining;
        log::debug!(node = %self.identity, "Node initialized");
    }

    /// Found the group (seed) or ask the introducer to let us in.
    pub fn bootstrap(&mut self, now: Tick) -> ProtocolResult<()> {
        if self.status != NodeStatus::Joining {
            return Err(ProtocolError::InvalidState {
                operation: "bootstrap",
                state: self.status,
            });
        }

        if self.is_seed() {
            log::info!(node = %self.identity, "Starting up group");
            self.state.in_group = true;
            self.state.table.touch_self(self.identity, 0, now);
            self.state.gossip_countdown = Some(self.config.seed_gossip_delay_ticks);
            self.status = NodeStatus::InGroup;
            metrics::table_size(&self.identity.to_string(), self.state.table.len());
            return Ok(());
        }

        self.state.self_heartbeat += 1;
        let request = Message::JoinRequest {
            requester: self.identity,
            heartbeat: self.state.self_heartbeat,
        };
        self.send(self.bootstrap, request.kind(), request.encode())
            .map_err(|source| ProtocolError::FatalBootstrap {
                bootstrap: self.bootstrap,
                source,
            })?;
        log::info!(node = %self.identity, bootstrap = %self.bootstrap, "Trying to join");
        Ok(())
    }

    /// `init` followed by `bootstrap`.
    pub fn start(&mut self, now: Tick) -> ProtocolResult<()> {
        self.init();
        self.bootstrap(now)
    }

    /// Crash-stop: the node stops receiving and ticking until re-initialized.
    pub fn fail(&mut self) {
        log::info!(node = %self.identity, "Node failed");
        self.state.failed = true;
        self.inbox.clear();
        self.status = NodeStatus::Failed;
    }

    /// Leave the group and discard all state. Idempotent.
    pub fn shutdown(&mut self) {
        if self.status != NodeStatus::Stopped {
            log::info!(node = %self.identity, "Node shutting down");
        }
        self.state = NodeRuntimeState::initial(&self.config);
        self.inbox.clear();
        self.status = NodeStatus::Stopped;
    }

    /// Move everything the transport holds for this node into the local
    /// inbox. Returns the number of payloads picked up.
    pub fn receive(&mut self) -> usize {
        if !self.accepts_traffic() {
            return 0;
        }
        let payloads = self.transport.poll(self.identity);
        let n = payloads.len();
        self.inbox.extend(payloads);
        n
    }

    /// Queue a payload as if the transport had delivered it.
    pub fn deliver(&mut self, payload: Bytes) {
        if self.accepts_traffic() {
            self.inbox.push_back(payload);
        }
    }

    /// Process the current inbox backlog.
    pub fn check_messages(&mut self, now: Tick) {
        while let Some(payload) = self.inbox.pop_front() {
            self.handle_payload(&payload, now);
        }
    }

    /// One protocol period: drain the inbox, then tick if in the group.
    pub fn node_loop(&mut self, now: Tick) -> Option<TickOutcome> {
        if !self.accepts_traffic() {
            return None;
        }
        self.check_messages(now);
        if !self.state.in_group {
            return None;
        }
        self.on_tick(now).ok()
    }

    /// Decode and dispatch one inbound payload. Malformed payloads are logged
    /// and dropped without touching any state.
    pub fn handle_payload(&mut self, payload: &[u8], now: Tick) {
        if !self.accepts_traffic() {
            return;
        }
        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                metrics::malformed_message();
                log::warn!(node = %self.identity, len = payload.len(), error = %e, "Dropping malformed message");
                return;
            }
        };
        metrics::message_received(message.kind());

        match message {
            Message::JoinRequest {
                requester,
                heartbeat,
            } => self.handle_join_request(requester, heartbeat, now),
            Message::JoinReply { entries } => self.handle_join_reply(&entries, now),
            Message::Gossip { entries } => self.handle_gossip(&entries, now),
        }
    }

    fn handle_join_request(&mut self, requester: NodeIdentity, heartbeat: i64, now: Tick) {
        if !self.is_seed() || !self.state.in_group {
            log::debug!(node = %self.identity, requester = %requester, "Ignoring join request, not the introducer");
            return;
        }
        if requester == self.identity {
            return;
        }

        // An explicit join always wins over a tombstone.
        self.state.tombstones.remove(&requester);
        if self.state.table.upsert_if_newer(requester, heartbeat, now) == Upsert::Inserted {
            self.member_added(requester, now);
        }

        let reply = Message::JoinReply {
            entries: self.state.table.entries(),
        };
        if let Err(e) = self.send(requester, reply.kind(), reply.encode()) {
            log::warn!(node = %self.identity, requester = %requester, error = %e, "Failed to send join reply");
        }
    }

    fn handle_join_reply(&mut self, entries: &[HeartbeatEntry], now: Tick) {
        if self.status != NodeStatus::Joining {
            log::debug!(node = %self.identity, "Ignoring duplicate join reply");
            return;
        }

        // Our own record is authored locally, never taken from a peer.
        let peers: Vec<HeartbeatEntry> = entries
            .iter()
            .filter(|e| e.identity != self.identity)
            .copied()
            .collect();
        self.state.table.replace_with(&peers, now);

        self.state.in_group = true;
        self.state.self_heartbeat = 0;
        self.advance_heartbeat(now);
        self.state.fail_timeout = self.config.fail_timeout_ticks;
        self.state.remove_timeout = self.config.remove_timeout_ticks;
        self.state.gossip_countdown = Some(self.config.gossip_period_ticks);
        self.status = NodeStatus::InGroup;

        let added: Vec<NodeIdentity> = self
            .state
            .table
            .identities()
            .filter(|id| *id != self.identity)
            .collect();
        for member in added {
            self.member_added(member, now);
        }
        log::info!(node = %self.identity, members = self.state.table.len(), "Joined group");
    }

    fn handle_gossip(&mut self, entries: &[HeartbeatEntry], now: Tick) {
        if !self.state.in_group {
            log::debug!(node = %self.identity, "Ignoring gossip before joining");
            return;
        }
        for entry in entries {
            if entry.identity == self.identity || self.is_buried(entry) {
                continue;
            }
            if self
                .state
                .table
                .upsert_if_newer(entry.identity, entry.heartbeat, now)
                == Upsert::Inserted
            {
                self.member_added(entry.identity, now);
            }
        }
    }

    /// Periodic maintenance: heartbeat, failure sweep, gossip.
    pub fn on_tick(&mut self, now: Tick) -> ProtocolResult<TickOutcome> {
        if self.status != NodeStatus::InGroup {
            return Err(ProtocolError::InvalidState {
                operation: "tick",
                state: self.status,
            });
        }

        // Must precede the sweep so the local record is never evicted.
        self.advance_heartbeat(now);

        let removed = self
            .state
            .table
            .sweep_expired(now, self.state.remove_timeout);
        for member in &removed {
            log::warn!(node = %self.identity, member = %member.identity, "Removing unresponsive member");
            self.observer.on_member_removed(self.identity, member.identity, now);
            if self.config.tombstone_ticks > 0 {
                self.state.tombstones.insert(
                    member.identity,
                    Tombstone {
                        heartbeat: member.heartbeat,
                        removed_at: now,
                    },
                );
            }
        }
        let ttl = self.config.tombstone_ticks;
        self.state
            .tombstones
            .retain(|_, t| now.saturating_sub(t.removed_at) <= ttl);
        let removed: Vec<NodeIdentity> = removed.iter().map(|r| r.identity).collect();
        if !removed.is_empty() {
            metrics::members_removed(removed.len());
        }

        let mut gossiped_to = Vec::new();
        if let Some(countdown) = self.state.gossip_countdown {
            let remaining = countdown.saturating_sub(1);
            if remaining == 0 {
                self.state.gossip_countdown = Some(self.config.gossip_period_ticks);
                gossiped_to = self.gossip();
            } else {
                self.state.gossip_countdown = Some(remaining);
            }
        }

        metrics::table_size(&self.identity.to_string(), self.state.table.len());
        Ok(TickOutcome {
            removed,
            gossiped_to,
        })
    }

    /// Gossip about a recently removed member that brings no newer heartbeat.
    fn is_buried(&self, entry: &HeartbeatEntry) -> bool {
        !self.state.table.contains(&entry.identity)
            && self
                .state
                .tombstones
                .get(&entry.identity)
                .is_some_and(|t| entry.heartbeat <= t.heartbeat)
    }

    fn advance_heartbeat(&mut self, now: Tick) {
        self.state.self_heartbeat += 1;
        self.state
            .table
            .touch_self(self.identity, self.state.self_heartbeat, now);
    }

    /// Send the full table to every peer, or to a random subset when a
    /// fan-out is configured.
    fn gossip(&mut self) -> Vec<NodeIdentity> {
        let peers: Vec<NodeIdentity> = self
            .state
            .table
            .identities()
            .filter(|id| *id != self.identity)
            .collect();
        let targets = match self.config.fanout {
            Some(k) => sample_peers(&peers, k, &mut self.rng),
            None => peers,
        };
        if targets.is_empty() {
            return targets;
        }

        let payload = Message::Gossip {
            entries: self.state.table.entries(),
        }
        .encode();

        let mut delivered = Vec::with_capacity(targets.len());
        for peer in targets {
            match self.send(peer, MessageKind::Gossip, payload.clone()) {
                Ok(()) => delivered.push(peer),
                Err(e) => {
                    log::warn!(node = %self.identity, peer = %peer, error = %e, "Failed to gossip to peer")
                }
            }
        }
        log::debug!(node = %self.identity, peers = delivered.len(), "Gossip round sent");
        delivered
    }

    fn send(&self, to: NodeIdentity, kind: MessageKind, payload: Bytes) -> Result<(), TransportError> {
        match self.transport.send(self.identity, to, payload) {
            Ok(()) => {
                metrics::message_sent(kind);
                Ok(())
            }
            Err(e) => {
                metrics::send_failed(kind);
                Err(e)
            }
        }
    }

    fn member_added(&self, member: NodeIdentity, now: Tick) {
        metrics::members_added(1);
        self.observer.on_member_added(self.identity, member, now);
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        message::HeartbeatEntry,
        observer::{EventRecorder, MembershipEventKind},
    };

    /// Records every send; optionally refuses them.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(NodeIdentity, NodeIdentity, Bytes)>>,
        refuse: bool,
    }

    impl RecordingTransport {
        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Default::default()
            }
        }

        fn take(&self) -> Vec<(NodeIdentity, NodeIdentity, Message)> {
            self.sent
                .lock()
                .drain(..)
                .map(|(from, to, p)| (from, to, Message::decode(&p).unwrap()))
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, from: NodeIdentity, to: NodeIdentity, payload: Bytes) -> Result<(), TransportError> {
            if self.refuse {
                return Err(TransportError::Unreachable(to));
            }
            self.sent.lock().push((from, to, payload));
            Ok(())
        }

        fn poll(&self, _node: NodeIdentity) -> Vec<Bytes> {
            Vec::new()
        }
    }

    fn id(n: u32) -> NodeIdentity {
        NodeIdentity::new(n, 0)
    }

    fn node(n: u32) -> MembershipNode<Arc<RecordingTransport>> {
        MembershipNode::new(
            id(n),
            NodeIdentity::bootstrap(),
            Arc::new(RecordingTransport::default()),
            ProtocolConfig::default(),
        )
        .unwrap()
    }

    fn seeded() -> MembershipNode<Arc<RecordingTransport>> {
        let mut seed = node(1);
        seed.start(0).unwrap();
        seed
    }

    const TOMBSTONE_TICKS: Tick = 40;

    fn seeded_with_tombstones() -> MembershipNode<Arc<RecordingTransport>> {
        let config = ProtocolConfig {
            tombstone_ticks: TOMBSTONE_TICKS,
            ..Default::default()
        };
        let mut seed = MembershipNode::new(
            id(1),
            id(1),
            Arc::new(RecordingTransport::default()),
            config,
        )
        .unwrap();
        seed.start(0).unwrap();
        seed
    }

    fn heartbeats<T: Transport>(node: &MembershipNode<T>) -> Vec<(u32, i64)> {
        node.table()
            .iter()
            .map(|r| (r.identity.host_id, r.heartbeat))
            .collect()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ProtocolConfig {
            remove_timeout_ticks: 1,
            ..Default::default()
        };
        let result = MembershipNode::new(id(2), id(1), Arc::new(RecordingTransport::default()), config);
        assert!(matches!(result, Err(ProtocolError::Config(_))));
    }

    #[test]
    fn test_seed_bootstrap_founds_group() {
        let seed = seeded();
        assert_eq!(seed.status(), NodeStatus::InGroup);
        assert!(seed.is_in_group());
        assert_eq!(heartbeats(&seed), vec![(1, 0)]);
        assert_eq!(seed.runtime().gossip_countdown, Some(10));
        assert!(seed.transport.take().is_empty());
    }

    #[test]
    fn test_bootstrap_requires_init() {
        let mut n = node(2);
        assert!(matches!(
            n.bootstrap(0),
            Err(ProtocolError::InvalidState {
                operation: "bootstrap",
                state: NodeStatus::Uninitialized
            })
        ));
    }

    #[test]
    fn test_joiner_sends_join_request() {
        let mut b = node(2);
        b.start(3).unwrap();
        assert_eq!(b.status(), NodeStatus::Joining);
        assert_eq!(b.self_heartbeat(), 1);
        assert!(b.table().is_empty());
        assert_eq!(
            b.transport.take(),
            vec![(
                id(2),
                id(1),
                Message::JoinRequest {
                    requester: id(2),
                    heartbeat: 1
                }
            )]
        );
    }

    #[test]
    fn test_bootstrap_send_failure_is_fatal() {
        let mut b = MembershipNode::new(
            id(2),
            id(1),
            Arc::new(RecordingTransport::refusing()),
            ProtocolConfig::default(),
        )
        .unwrap();
        let err = b.start(0).unwrap_err();
        assert!(matches!(err, ProtocolError::FatalBootstrap { bootstrap, .. } if bootstrap == id(1)));
        assert_eq!(b.status(), NodeStatus::Joining);
    }

    #[test]
    fn test_introducer_answers_join_request_with_full_table() {
        let mut seed = seeded();
        let request = Message::JoinRequest {
            requester: id(2),
            heartbeat: 1,
        };
        seed.handle_payload(&request.encode(), 4);

        assert_eq!(heartbeats(&seed), vec![(1, 0), (2, 1)]);
        assert_eq!(seed.status(), NodeStatus::InGroup);
        let sent = seed.transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, id(2));
        assert_eq!(
            sent[0].2,
            Message::JoinReply {
                entries: vec![HeartbeatEntry::new(id(1), 0), HeartbeatEntry::new(id(2), 1)]
            }
        );
    }

    #[test]
    fn test_non_introducer_ignores_join_request() {
        let mut seed = seeded();
        let mut c = node(3);
        c.start(0).unwrap();
        c.transport.take();
        c.handle_payload(
            &Message::JoinReply {
                entries: seed.table().entries(),
            }
            .encode(),
            1,
        );
        c.handle_payload(
            &Message::JoinRequest {
                requester: id(4),
                heartbeat: 1,
            }
            .encode(),
            2,
        );
        assert!(!c.table().contains(&id(4)));
        assert!(c.transport.take().is_empty());
        seed.shutdown();
    }

    #[test]
    fn test_join_reply_hydrates_and_bumps_self() {
        let mut b = node(2);
        b.start(0).unwrap();
        let reply = Message::JoinReply {
            entries: vec![HeartbeatEntry::new(id(1), 0), HeartbeatEntry::new(id(2), 1)],
        };
        b.handle_payload(&reply.encode(), 5);

        assert_eq!(b.status(), NodeStatus::InGroup);
        assert_eq!(b.self_heartbeat(), 1);
        assert_eq!(heartbeats(&b), vec![(1, 0), (2, 1)]);
        assert_eq!(b.table().get(&id(2)).map(|r| r.last_updated), Some(5));
        assert_eq!(b.runtime().gossip_countdown, Some(5));
    }

    #[test]
    fn test_duplicate_join_reply_is_noop() {
        let mut b = node(2);
        b.start(0).unwrap();
        let first = Message::JoinReply {
            entries: vec![HeartbeatEntry::new(id(1), 0)],
        };
        b.handle_payload(&first.encode(), 1);
        let before = b.runtime().clone();

        let second = Message::JoinReply {
            entries: vec![HeartbeatEntry::new(id(1), 9), HeartbeatEntry::new(id(7), 3)],
        };
        b.handle_payload(&second.encode(), 2);
        assert_eq!(b.runtime(), &before);
    }

    #[test]
    fn test_gossip_ignored_while_joining() {
        let mut b = node(2);
        b.start(0).unwrap();
        b.handle_payload(
            &Message::Gossip {
                entries: vec![HeartbeatEntry::new(id(5), 1)],
            }
            .encode(),
            1,
        );
        assert!(b.table().is_empty());
    }

    #[test]
    fn test_gossip_merges_and_notifies_new_members() {
        let recorder = EventRecorder::new();
        let mut seed = seeded().with_observer(Arc::new(recorder.clone()));
        let gossip = Message::Gossip {
            entries: vec![
                HeartbeatEntry::new(id(1), 99),
                HeartbeatEntry::new(id(3), 4),
                HeartbeatEntry::new(id(4), 2),
            ],
        };
        seed.handle_payload(&gossip.encode(), 7);
        seed.handle_payload(&gossip.encode(), 8);

        // Own record is never raised by peers.
        assert_eq!(heartbeats(&seed), vec![(1, 0), (3, 4), (4, 2)]);
        assert_eq!(recorder.count(MembershipEventKind::Added), 2);
    }

    #[test]
    fn test_malformed_gossip_leaves_state_untouched() {
        let mut seed = seeded();
        seed.handle_payload(
            &Message::Gossip {
                entries: vec![HeartbeatEntry::new(id(3), 1)],
            }
            .encode(),
            1,
        );
        let before = seed.runtime().clone();

        let mut payload = Message::Gossip {
            entries: vec![
                HeartbeatEntry::new(id(5), 1),
                HeartbeatEntry::new(id(6), 1),
                HeartbeatEntry::new(id(7), 1),
            ],
        }
        .encode()
        .to_vec();
        payload[1..5].copy_from_slice(&5u32.to_le_bytes());
        seed.handle_payload(&payload, 2);
        seed.handle_payload(&[], 2);
        seed.handle_payload(&[42], 2);

        assert_eq!(seed.runtime(), &before);
        assert_eq!(seed.status(), NodeStatus::InGroup);
    }

    #[test]
    fn test_tick_advances_heartbeat_and_gossips_on_countdown() {
        let mut seed = seeded();
        seed.handle_payload(
            &Message::JoinRequest {
                requester: id(2),
                heartbeat: 1,
            }
            .encode(),
            0,
        );
        seed.transport.take();

        for now in 1..10 {
            let outcome = seed.on_tick(now).unwrap();
            assert!(outcome.gossiped_to.is_empty(), "gossiped early at {now}");
        }
        assert_eq!(seed.self_heartbeat(), 9);
        assert!(seed.transport.take().is_empty());

        let outcome = seed.on_tick(10).unwrap();
        assert_eq!(outcome.gossiped_to, vec![id(2)]);
        assert_eq!(seed.runtime().gossip_countdown, Some(5));
        let sent = seed.transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].2,
            Message::Gossip {
                entries: vec![HeartbeatEntry::new(id(1), 10), HeartbeatEntry::new(id(2), 1)]
            }
        );
    }

    #[test]
    fn test_tick_sweeps_expired_peers_but_not_self() {
        let recorder = EventRecorder::new();
        let mut seed = seeded().with_observer(Arc::new(recorder.clone()));
        seed.handle_payload(
            &Message::Gossip {
                entries: vec![HeartbeatEntry::new(id(2), 1)],
            }
            .encode(),
            0,
        );

        for now in 1..=20 {
            assert!(seed.on_tick(now).unwrap().removed.is_empty());
        }
        assert_eq!(seed.stale_members(20), vec![id(2)]);

        let outcome = seed.on_tick(21).unwrap();
        assert_eq!(outcome.removed, vec![id(2)]);
        assert_eq!(seed.members(), vec![id(1)]);
        assert_eq!(recorder.count(MembershipEventKind::Removed), 1);
    }

    #[test]
    fn test_gossip_reinserts_swept_member_by_default() {
        let recorder = EventRecorder::new();
        let mut seed = seeded().with_observer(Arc::new(recorder.clone()));
        let stale = Message::Gossip {
            entries: vec![HeartbeatEntry::new(id(2), 4)],
        }
        .encode();
        seed.handle_payload(&stale, 0);
        for now in 1..=21 {
            seed.on_tick(now).unwrap();
        }
        assert!(!seed.table().contains(&id(2)));
        assert!(seed.runtime().tombstones.is_empty());

        // Absent identities are always inserted by the merge.
        seed.handle_payload(&stale, 22);
        assert_eq!(
            seed.table().get(&id(2)).map(|r| (r.heartbeat, r.last_updated)),
            Some((4, 22))
        );
        assert_eq!(recorder.count(MembershipEventKind::Added), 2);
    }

    #[test]
    fn test_removed_member_is_not_resurrected_by_stale_gossip() {
        let recorder = EventRecorder::new();
        let mut seed = seeded_with_tombstones().with_observer(Arc::new(recorder.clone()));
        let stale = Message::Gossip {
            entries: vec![HeartbeatEntry::new(id(2), 4)],
        }
        .encode();
        seed.handle_payload(&stale, 0);
        for now in 1..=21 {
            seed.on_tick(now).unwrap();
        }
        assert!(!seed.table().contains(&id(2)));
        assert_eq!(
            seed.runtime().tombstones.get(&id(2)),
            Some(&Tombstone {
                heartbeat: 4,
                removed_at: 21
            })
        );

        // A peer that has not evicted it yet echoes the old heartbeat.
        seed.handle_payload(&stale, 22);
        assert!(!seed.table().contains(&id(2)));

        // Newer news means the member is really alive.
        seed.handle_payload(
            &Message::Gossip {
                entries: vec![HeartbeatEntry::new(id(2), 5)],
            }
            .encode(),
            23,
        );
        assert!(seed.table().contains(&id(2)));
        assert_eq!(recorder.count(MembershipEventKind::Added), 2);
    }

    #[test]
    fn test_tombstones_expire() {
        let mut seed = seeded_with_tombstones();
        let stale = Message::Gossip {
            entries: vec![HeartbeatEntry::new(id(2), 4)],
        }
        .encode();
        seed.handle_payload(&stale, 0);
        for now in 1..=21 {
            seed.on_tick(now).unwrap();
        }
        assert_eq!(seed.runtime().tombstones.len(), 1);
        for now in 22..=21 + TOMBSTONE_TICKS + 1 {
            seed.on_tick(now).unwrap();
        }
        assert!(seed.runtime().tombstones.is_empty());
        seed.handle_payload(&stale, 70);
        assert!(seed.table().contains(&id(2)));
    }

    #[test]
    fn test_tick_rejected_outside_group() {
        let mut b = node(2);
        assert!(b.on_tick(0).is_err());
        b.start(0).unwrap();
        assert!(matches!(
            b.on_tick(1),
            Err(ProtocolError::InvalidState {
                state: NodeStatus::Joining,
                ..
            })
        ));
        assert_eq!(b.node_loop(1), None);
    }

    #[test]
    fn test_partial_fanout_limits_targets() {
        let config = ProtocolConfig {
            fanout: Some(2),
            seed_gossip_delay_ticks: 1,
            ..Default::default()
        };
        let mut seed = MembershipNode::new(
            id(1),
            id(1),
            Arc::new(RecordingTransport::default()),
            config,
        )
        .unwrap()
        .with_rng(StdRng::seed_from_u64(3));
        seed.start(0).unwrap();
        let entries = (2..10).map(|n| HeartbeatEntry::new(id(n), 1)).collect();
        seed.handle_payload(&Message::Gossip { entries }.encode(), 0);

        let outcome = seed.on_tick(1).unwrap();
        assert_eq!(outcome.gossiped_to.len(), 2);
        assert!(!outcome.gossiped_to.contains(&id(1)));
    }

    #[test]
    fn test_failed_node_ignores_everything() {
        let mut seed = seeded();
        seed.fail();
        assert!(seed.is_failed());
        seed.deliver(
            Message::JoinRequest {
                requester: id(2),
                heartbeat: 1,
            }
            .encode(),
        );
        assert_eq!(seed.pending_messages(), 0);
        assert_eq!(seed.node_loop(5), None);
        assert!(seed.transport.take().is_empty());
    }

    #[test]
    fn test_shutdown_resets_and_is_idempotent() {
        let mut seed = seeded();
        seed.on_tick(1).unwrap();
        seed.shutdown();
        seed.shutdown();
        assert_eq!(seed.status(), NodeStatus::Stopped);
        assert!(seed.table().is_empty());
        assert_eq!(seed.runtime(), &NodeRuntimeState::initial(&ProtocolConfig::default()));

        // A stopped node can rejoin.
        seed.start(2).unwrap();
        assert_eq!(seed.status(), NodeStatus::InGroup);
    }
}
