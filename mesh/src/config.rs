//! Protocol timing configuration.

use serde::{Deserialize, Serialize};

use crate::{clock::Tick, error::ConfigError};

/// Ticks without news before a member is reported stale.
pub const DEFAULT_FAIL_TIMEOUT: Tick = 5;
/// Ticks without news before a member is removed.
pub const DEFAULT_REMOVE_TIMEOUT: Tick = 20;
/// Countdown armed by the seed node when it founds the group.
pub const DEFAULT_SEED_GOSSIP_DELAY: Tick = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub fail_timeout_ticks: Tick,
    pub remove_timeout_ticks: Tick,
    /// Steady-state gap between two gossip rounds.
    pub gossip_period_ticks: Tick,
    pub seed_gossip_delay_ticks: Tick,
    /// `None` gossips to every known peer, `Some(k)` to `k` random peers.
    pub fanout: Option<usize>,
    /// Gossip about a removed member is ignored for this many ticks unless it
    /// carries a newer heartbeat. Zero (the default) disables tombstones and
    /// every gossiped entry is merged.
    pub tombstone_ticks: Tick,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fail_timeout_ticks: DEFAULT_FAIL_TIMEOUT,
            remove_timeout_ticks: DEFAULT_REMOVE_TIMEOUT,
            gossip_period_ticks: DEFAULT_FAIL_TIMEOUT,
            seed_gossip_delay_ticks: DEFAULT_SEED_GOSSIP_DELAY,
            fanout: None,
            tombstone_ticks: 0,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remove_timeout_ticks <= self.fail_timeout_ticks {
            return Err(ConfigError::InvalidTimeouts {
                fail: self.fail_timeout_ticks,
                remove: self.remove_timeout_ticks,
            });
        }
        if self.gossip_period_ticks == 0 || self.seed_gossip_delay_ticks == 0 {
            return Err(ConfigError::ZeroGossipPeriod);
        }
        if self.fanout == Some(0) {
            return Err(ConfigError::ZeroFanout);
        }
        Ok(())
    }
}
