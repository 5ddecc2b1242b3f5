//! Protocol metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the host
//! installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::message::MessageKind;

pub const MESSAGES_SENT: &str = "gossip_mesh_messages_sent_total";
pub const MESSAGES_RECEIVED: &str = "gossip_mesh_messages_received_total";
pub const MALFORMED_MESSAGES: &str = "gossip_mesh_malformed_messages_total";
pub const SEND_FAILURES: &str = "gossip_mesh_send_failures_total";
pub const MEMBERS_ADDED: &str = "gossip_mesh_members_added_total";
pub const MEMBERS_REMOVED: &str = "gossip_mesh_members_removed_total";
pub const MEMBERS: &str = "gossip_mesh_members";

pub fn describe() {
    describe_counter!(MESSAGES_SENT, "Messages handed to the transport");
    describe_counter!(MESSAGES_RECEIVED, "Messages decoded from the transport");
    describe_counter!(MALFORMED_MESSAGES, "Inbound payloads dropped as malformed");
    describe_counter!(SEND_FAILURES, "Sends rejected by the transport");
    describe_counter!(MEMBERS_ADDED, "Members inserted into a local table");
    describe_counter!(MEMBERS_REMOVED, "Members evicted by the failure sweep");
    describe_gauge!(MEMBERS, "Size of the local membership table");
}

pub(crate) fn message_sent(kind: MessageKind) {
    counter!(MESSAGES_SENT, "kind" => kind.as_str()).increment(1);
}

pub(crate) fn message_received(kind: MessageKind) {
    counter!(MESSAGES_RECEIVED, "kind" => kind.as_str()).increment(1);
}

pub(crate) fn malformed_message() {
    counter!(MALFORMED_MESSAGES).increment(1);
}

pub(crate) fn send_failed(kind: MessageKind) {
    counter!(SEND_FAILURES, "kind" => kind.as_str()).increment(1);
}

pub(crate) fn members_added(n: usize) {
    counter!(MEMBERS_ADDED).increment(n as u64);
}

pub(crate) fn members_removed(n: usize) {
    counter!(MEMBERS_REMOVED).increment(n as u64);
}

pub(crate) fn table_size(node: &str, n: usize) {
    gauge!(MEMBERS, "node" => node.to_string()).set(n as f64);
}
