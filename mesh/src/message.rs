//! Wire messages exchanged between group members
//!
//! Every message starts with a single kind byte. All integers are
//! little-endian and records are packed with no padding:
//!
//! ```text
//! JOIN_REQUEST  [0][tag:6][heartbeat:i64]
//! JOIN_REPLY    [1][count:u32]([tag:6][heartbeat:i64]) * count
//! GOSSIP        [2][count:u32]([tag:6][heartbeat:i64]) * count
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{
    address::{AddressTag, NodeIdentity, ADDRESS_TAG_LEN},
    error::{CodecError, CodecResult},
};

/// Size of the kind byte.
pub const HEADER_LEN: usize = 1;
/// Size of one packed `(tag, heartbeat)` entry.
pub const ENTRY_LEN: usize = ADDRESS_TAG_LEN + 8;
/// Size of the record count prefix of a list body.
pub const COUNT_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    JoinRequest = 0,
    JoinReply = 1,
    Gossip = 2,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::JoinRequest => "join_request",
            MessageKind::JoinReply => "join_reply",
            MessageKind::Gossip => "gossip",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::JoinRequest),
            1 => Ok(MessageKind::JoinReply),
            2 => Ok(MessageKind::Gossip),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

/// One `(identity, heartbeat)` pair as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEntry {
    pub identity: NodeIdentity,
    pub heartbeat: i64,
}

impl HeartbeatEntry {
    pub fn new(identity: NodeIdentity, heartbeat: i64) -> Self {
        Self {
            identity,
            heartbeat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    JoinRequest { requester: NodeIdentity, heartbeat: i64 },
    JoinReply { entries: Vec<HeartbeatEntry> },
    Gossip { entries: Vec<HeartbeatEntry> },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::JoinRequest { .. } => MessageKind::JoinRequest,
            Message::JoinReply { .. } => MessageKind::JoinReply,
            Message::Gossip { .. } => MessageKind::Gossip,
        }
    }

    /// Exact number of bytes [`Message::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::JoinRequest { .. } => HEADER_LEN + ENTRY_LEN,
            Message::JoinReply { entries } | Message::Gossip { entries } => {
                HEADER_LEN + COUNT_LEN + entries.len() * ENTRY_LEN
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.kind() as u8);
        match self {
            Message::JoinRequest {
                requester,
                heartbeat,
            } => put_entry(&mut buf, &HeartbeatEntry::new(*requester, *heartbeat)),
            Message::JoinReply { entries } | Message::Gossip { entries } => {
                // Tables are bounded by the group size, far below u32::MAX.
                buf.put_u32_le(entries.len() as u32);
                for entry in entries {
                    put_entry(&mut buf, entry);
                }
            }
        }
        buf.freeze()
    }

    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        let mut buf = payload;
        if !buf.has_remaining() {
            return Err(CodecError::Empty);
        }
        let kind = MessageKind::try_from(buf.get_u8())?;

        let message = match kind {
            MessageKind::JoinRequest => {
                let entry = get_entry(&mut buf)?;
                Message::JoinRequest {
                    requester: entry.identity,
                    heartbeat: entry.heartbeat,
                }
            }
            MessageKind::JoinReply => Message::JoinReply {
                entries: get_entries(&mut buf)?,
            },
            MessageKind::Gossip => Message::Gossip {
                entries: get_entries(&mut buf)?,
            },
        };

        if buf.has_remaining() {
            return Err(CodecError::TrailingBytes(buf.remaining()));
        }
        Ok(message)
    }
}

fn put_entry(buf: &mut BytesMut, entry: &HeartbeatEntry) {
    buf.put_slice(entry.identity.tag().as_bytes());
    buf.put_i64_le(entry.heartbeat);
}

fn ensure(buf: &[u8], needed: usize) -> CodecResult<()> {
    if buf.remaining() < needed {
        return Err(CodecError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn get_entry(buf: &mut &[u8]) -> CodecResult<HeartbeatEntry> {
    ensure(*buf, ENTRY_LEN)?;
    let mut tag = [0u8; ADDRESS_TAG_LEN];
    buf.copy_to_slice(&mut tag);
    let heartbeat = buf.get_i64_le();
    Ok(HeartbeatEntry::new(
        AddressTag::from_bytes(tag).decode(),
        heartbeat,
    ))
}

fn get_entries(buf: &mut &[u8]) -> CodecResult<Vec<HeartbeatEntry>> {
    ensure(*buf, COUNT_LEN)?;
    let declared = buf.get_u32_le() as usize;

    // Validate the declared count against the body before allocating for it.
    let available = buf.remaining() / ENTRY_LEN;
    if declared != available || buf.remaining() % ENTRY_LEN != 0 {
        return Err(CodecError::CountMismatch {
            declared,
            available,
        });
    }

    (0..declared).map(|_| get_entry(buf)).collect()
}
