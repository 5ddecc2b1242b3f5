//! Random gossip target selection.

use rand::{seq::IndexedRandom, Rng};

use crate::address::NodeIdentity;

/// Pick up to `k` distinct peers uniformly at random from the caller's
/// random source.
pub fn sample_peers<R: Rng + ?Sized>(
    peers: &[NodeIdentity],
    k: usize,
    rng: &mut R,
) -> Vec<NodeIdentity> {
    if k >= peers.len() {
        return peers.to_vec();
    }
    peers.choose_multiple(rng, k).copied().collect()
}
