//! Transport collaborator consumed by the engine.
//!
//! Delivery is unreliable: messages may be dropped, delayed, duplicated or
//! reordered. `send` is fire-and-forget and `poll` never blocks.

use std::sync::Arc;

use bytes::Bytes;

use crate::{address::NodeIdentity, error::TransportError};

pub trait Transport: Send + Sync {
    fn send(&self, from: NodeIdentity, to: NodeIdentity, payload: Bytes)
        -> Result<(), TransportError>;

    /// Take every payload currently waiting for `node`, oldest first.
    fn poll(&self, node: NodeIdentity) -> Vec<Bytes>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(
        &self,
        from: NodeIdentity,
        to: NodeIdentity,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        (**self).send(from, to, payload)
    }

    fn poll(&self, node: NodeIdentity) -> Vec<Bytes> {
        (**self).poll(node)
    }
}
