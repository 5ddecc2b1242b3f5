//! Membership change notifications
//!
//! Observers are pure notification hooks: they return nothing and must not
//! fail the engine that calls them.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{address::NodeIdentity, clock::Tick};

pub trait MembershipObserver: Send + Sync {
    fn on_member_added(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick);
    fn on_member_removed(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick);
}

/// Logs every change at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MembershipObserver for TracingObserver {
    fn on_member_added(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick) {
        info!(node = %observer, member = %subject, tick = at, "Node {} joined", subject);
    }

    fn on_member_removed(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick) {
        info!(node = %observer, member = %subject, tick = at, "Node {} removed", subject);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MembershipObserver for NoopObserver {
    fn on_member_added(&self, _: NodeIdentity, _: NodeIdentity, _: Tick) {}
    fn on_member_removed(&self, _: NodeIdentity, _: NodeIdentity, _: Tick) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipEventKind {
    Added,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub observer: NodeIdentity,
    pub subject: NodeIdentity,
    pub kind: MembershipEventKind,
    pub at: Tick,
}

/// Collects events in memory; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<MembershipEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, observer: NodeIdentity) -> Vec<MembershipEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.observer == observer)
            .copied()
            .collect()
    }

    pub fn count(&self, kind: MembershipEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    fn push(&self, observer: NodeIdentity, subject: NodeIdentity, kind: MembershipEventKind, at: Tick) {
        self.events.lock().push(MembershipEvent {
            observer,
            subject,
            kind,
            at,
        });
    }
}

impl MembershipObserver for EventRecorder {
    fn on_member_added(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick) {
        self.push(observer, subject, MembershipEventKind::Added, at);
    }

    fn on_member_removed(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick) {
        self.push(observer, subject, MembershipEventKind::Removed, at);
    }
}

/// Forwards every notification to each inner observer in order.
#[derive(Clone, Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn MembershipObserver>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn MembershipObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl MembershipObserver for FanoutObserver {
    fn on_member_added(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick) {
        for o in &self.observers {
            o.on_member_added(observer, subject, at);
        }
    }

    fn on_member_removed(&self, observer: NodeIdentity, subject: NodeIdentity, at: Tick) {
        for o in &self.observers {
            o.on_member_removed(observer, subject, at);
        }
    }
}
