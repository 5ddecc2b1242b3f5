//! Gossip Membership Protocol
//!
//! This crate lets every node of a group keep an eventually consistent view of
//! which other nodes are alive, with no coordinator beyond a single well-known
//! introducer used for the first join:
//! - Join handshake with the introducer (JOIN_REQUEST / JOIN_REPLY)
//! - Heartbeat-based failure detection with a single removal timeout
//! - Full-table gossip merged with monotonic-max semantics
//! - An in-memory emulated network and a tokio host for running groups

pub mod address;
pub mod clock;
pub mod config;
pub mod emulnet;
pub mod engine;
pub mod error;
pub mod message;
pub mod metrics;
pub mod observer;
pub mod runner;
pub mod sampling;
pub mod table;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use address::{AddressTag, NodeIdentity, ADDRESS_TAG_LEN};
pub use clock::{Clock, IntervalClock, ManualClock, Tick};
pub use config::ProtocolConfig;
pub use emulnet::{EmulNet, EmulNetConfig, NetStats, NodeTraffic};
pub use engine::{MembershipNode, NodeRuntimeState, NodeStatus, TickOutcome, Tombstone};
pub use error::{CodecError, ConfigError, ProtocolError, ProtocolResult, TransportError};
pub use message::{HeartbeatEntry, Message, MessageKind};
pub use observer::{
    EventRecorder, FanoutObserver, MembershipEvent, MembershipEventKind, MembershipObserver,
    NoopObserver, TracingObserver,
};
pub use runner::NodeRunner;
pub use sampling::sample_peers;
pub use table::{MemberRecord, MembershipTable, Upsert};
pub use transport::Transport;
