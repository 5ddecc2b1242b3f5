//! In-memory emulated network
//!
//! A shared message buffer that every node of a simulated group sends into and
//! polls from. It can drop messages at random to model an unreliable network,
//! and keeps per-node counters of what was sent and received.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use bytes::Bytes;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{address::NodeIdentity, error::TransportError, transport::Transport};

pub const DEFAULT_BUFFER_CAPACITY: usize = 30_000;
pub const DEFAULT_MAX_PAYLOAD: usize = 4_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulNetConfig {
    pub buffer_capacity: usize,
    pub max_payload: usize,
    pub seed: u64,
}

impl Default for EmulNetConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_payload: DEFAULT_MAX_PAYLOAD,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    sent: u64,
    received: u64,
    dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTraffic {
    pub node: NodeIdentity,
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

/// Snapshot of per-node traffic counters, ordered by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetStats {
    pub nodes: Vec<NodeTraffic>,
    pub in_flight: usize,
}

impl NetStats {
    pub fn node(&self, node: NodeIdentity) -> Option<&NodeTraffic> {
        self.nodes.iter().find(|t| t.node == node)
    }

    pub fn total_sent(&self) -> u64 {
        self.nodes.iter().map(|t| t.sent).sum()
    }

    pub fn total_received(&self) -> u64 {
        self.nodes.iter().map(|t| t.received).sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.nodes.iter().map(|t| t.dropped).sum()
    }
}

#[derive(Debug)]
struct Envelope {
    to: NodeIdentity,
    payload: Bytes,
}

#[derive(Debug)]
struct Inner {
    buffer: VecDeque<Envelope>,
    drop_probability: f64,
    rng: StdRng,
    traffic: BTreeMap<NodeIdentity, Counters>,
}

/// Handle to a shared emulated network; clones refer to the same buffer.
#[derive(Debug, Clone)]
pub struct EmulNet {
    config: Arc<EmulNetConfig>,
    inner: Arc<Mutex<Inner>>,
}

impl EmulNet {
    pub fn new(config: EmulNetConfig) -> Self {
        let inner = Inner {
            buffer: VecDeque::new(),
            drop_probability: 0.0,
            rng: StdRng::seed_from_u64(config.seed),
            traffic: BTreeMap::new(),
        };
        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Probability in `[0, 1]` that a sent message is silently lost.
    pub fn set_drop_probability(&self, probability: f64) {
        self.inner.lock().drop_probability = probability.clamp(0.0, 1.0);
    }

    pub fn drop_probability(&self) -> f64 {
        self.inner.lock().drop_probability
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn stats(&self) -> NetStats {
        let inner = self.inner.lock();
        NetStats {
            nodes: inner
                .traffic
                .iter()
                .map(|(node, c)| NodeTraffic {
                    node: *node,
                    sent: c.sent,
                    received: c.received,
                    dropped: c.dropped,
                })
                .collect(),
            in_flight: inner.buffer.len(),
        }
    }

    /// Discard every undelivered message.
    pub fn clear(&self) {
        self.inner.lock().buffer.clear();
    }
}

impl Default for EmulNet {
    fn default() -> Self {
        Self::new(EmulNetConfig::default())
    }
}

impl Transport for EmulNet {
    fn send(&self, from: NodeIdentity, to: NodeIdentity, payload: Bytes) -> Result<(), TransportError> {
        if payload.len() > self.config.max_payload {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload,
            });
        }

        let mut inner = self.inner.lock();
        if inner.buffer.len() >= self.config.buffer_capacity {
            return Err(TransportError::BufferFull {
                capacity: self.config.buffer_capacity,
            });
        }

        let p = inner.drop_probability;
        let dropped = p > 0.0 && inner.rng.random_bool(p);
        let traffic = inner.traffic.entry(from).or_default();
        if dropped {
            traffic.dropped += 1;
            trace!(from = %from, to = %to, "Dropping message");
            return Ok(());
        }
        traffic.sent += 1;
        inner.buffer.push_back(Envelope { to, payload });
        Ok(())
    }

    fn poll(&self, node: NodeIdentity) -> Vec<Bytes> {
        let mut inner = self.inner.lock();
        let mut delivered = Vec::new();
        let mut kept = VecDeque::with_capacity(inner.buffer.len());
        for envelope in inner.buffer.drain(..) {
            if envelope.to == node {
                delivered.push(envelope.payload);
            } else {
                kept.push_back(envelope);
            }
        }
        inner.buffer = kept;
        if !delivered.is_empty() {
            inner.traffic.entry(node).or_default().received += delivered.len() as u64;
        }
        delivered
    }
}
