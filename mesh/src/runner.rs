//! Tokio host for a single node
//!
//! Each node runs in its own task: one interval tick drains the transport and
//! runs a protocol period. The node is owned by the task, so its table is
//! never touched from two threads.

use std::time::Duration;

use tokio::{sync::watch, time::interval};
use tracing::{debug, info, instrument, warn};

use crate::{
    clock::Clock,
    engine::{MembershipNode, NodeStatus},
    error::ProtocolResult,
    transport::Transport,
};

pub struct NodeRunner<T: Transport, C: Clock> {
    node: MembershipNode<T>,
    clock: C,
    period: Duration,
}

impl<T: Transport, C: Clock> NodeRunner<T, C> {
    pub fn new(node: MembershipNode<T>, clock: C, period: Duration) -> Self {
        Self {
            node,
            clock,
            period,
        }
    }

    /// Start the node and drive it until `shutdown_rx` fires.
    ///
    /// The node is shut down before it is handed back so its final state is
    /// always `Stopped`. A fatal bootstrap failure is returned immediately.
    #[instrument(fields(node = %self.node.identity()), skip(self, shutdown_rx))]
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> ProtocolResult<MembershipNode<T>> {
        self.node.start(self.clock.now())?;

        let mut interval_timer = interval(self.period);
        info!(period = ?self.period, "Starting membership node loop");

        loop {
            tokio::select! {
                _ = interval_timer.tick() => {
                    let now = self.clock.now();
                    let received = self.node.receive();
                    if let Some(outcome) = self.node.node_loop(now) {
                        if !outcome.removed.is_empty() {
                            warn!(removed = ?outcome.removed, tick = now, "Members removed");
                        }
                    }
                    debug!(tick = now, received, status = ?self.node.status(), "Protocol period complete");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Membership node received shutdown signal");
                        break;
                    }
                }
            }
        }

        if self.node.status() != NodeStatus::Stopped {
            self.node.shutdown();
        }
        Ok(self.node)
    }
}
