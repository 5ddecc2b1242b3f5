//! Local time source measured in protocol ticks.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Unit of every timeout and period in the protocol.
pub type Tick = u64;

/// Monotonic tick source consumed by hosts of the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Clock advanced explicitly by a driver, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one tick and return the new time.
    pub fn advance(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn set(&self, tick: Tick) {
        self.ticks.fetch_max(tick, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.ticks.load(Ordering::SeqCst)
    }
}

/// Wall-clock time since creation divided into fixed-length ticks.
///
/// Uses tokio's clock so paused-time tests drive it deterministically.
#[derive(Debug, Clone)]
pub struct IntervalClock {
    start: tokio::time::Instant,
    period: Duration,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        Self {
            start: tokio::time::Instant::now(),
            period: period.max(Duration::from_millis(1)),
        }
    }
}

impl Clock for IntervalClock {
    fn now(&self) -> Tick {
        let elapsed = self.start.elapsed().as_nanos();
        (elapsed / self.period.as_nanos()) as Tick
    }
}
