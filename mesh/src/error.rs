//! Error types for the membership protocol.
//!
//! Decode failures (`CodecError`) and transport failures (`TransportError`) are
//! recoverable and only ever logged by the engine. `ProtocolError` is what the
//! public engine API returns to its caller.

use thiserror::Error;

use crate::{address::NodeIdentity, engine::NodeStatus};

pub type CodecResult<T> = Result<T, CodecError>;
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// An inbound payload that cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Empty payload")]
    Empty,

    #[error("Unknown message kind: {0}")]
    UnknownKind(u8),

    #[error("Truncated payload: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Declared {declared} records but payload holds {available}")]
    CountMismatch { declared: usize, available: usize },

    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),
}

/// Failure reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network buffer full ({capacity} messages)")]
    BufferFull { capacity: usize },

    #[error("Payload of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Peer {0} is unreachable")]
    Unreachable(NodeIdentity),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Remove timeout ({remove}) must exceed fail timeout ({fail})")]
    InvalidTimeouts { fail: u64, remove: u64 },

    #[error("Gossip period must be at least one tick")]
    ZeroGossipPeriod,

    #[error("Fanout must be at least one peer")]
    ZeroFanout,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The initial join request could not even be handed to the transport.
    #[error("Failed to send join request to {bootstrap}: {source}")]
    FatalBootstrap {
        bootstrap: NodeIdentity,
        #[source]
        source: TransportError,
    },

    #[error("Cannot {operation} while node is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: NodeStatus,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
