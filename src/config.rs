//! Simulation configuration
//!
//! Loaded from YAML; every field has a default so a partial file (or none at
//! all) is enough. The binary layers command line overrides on top.

use std::path::Path;

use gossip_mesh::{clock::Tick, EmulNetConfig, ProtocolConfig};
use serde::{Deserialize, Serialize};

use crate::error::SimConfigError;

/// Which nodes crash at `failure_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    None,
    /// One randomly chosen node.
    #[default]
    Single,
    /// A random contiguous half of the group.
    Multi,
}

/// Messages sent in `[start, end)` are lost with `probability`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropWindow {
    pub start: Tick,
    pub end: Tick,
    pub probability: f64,
}

impl Default for DropWindow {
    fn default() -> Self {
        Self {
            start: 50,
            end: 300,
            probability: 0.1,
        }
    }
}

impl DropWindow {
    pub fn is_active(&self, now: Tick) -> bool {
        (self.start..self.end).contains(&now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub nodes: u32,
    pub total_ticks: Tick,
    /// Node `i` starts at tick `floor(i * step_rate)`.
    pub step_rate: f64,
    pub failure: FailureMode,
    pub failure_tick: Tick,
    /// No message loss when absent.
    pub drop: Option<DropWindow>,
    /// Seeds failure selection and per-node fan-out sampling.
    pub seed: u64,
    pub network: EmulNetConfig,
    pub protocol: ProtocolConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            total_ticks: 700,
            step_rate: 0.25,
            failure: FailureMode::default(),
            failure_tick: 100,
            drop: None,
            seed: 0,
            network: EmulNetConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SimConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SimConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimConfigError> {
        if self.nodes == 0 {
            return Err(SimConfigError::NoNodes);
        }
        if !self.step_rate.is_finite() || self.step_rate < 0.0 {
            return Err(SimConfigError::InvalidStepRate(self.step_rate));
        }
        if let Some(window) = &self.drop {
            if !(0.0..=1.0).contains(&window.probability) {
                return Err(SimConfigError::InvalidDropProbability(window.probability));
            }
            if window.start >= window.end {
                return Err(SimConfigError::InvalidDropWindow {
                    start: window.start,
                    end: window.end,
                });
            }
        }
        self.protocol.validate()?;
        Ok(())
    }

    /// Tick at which node `index` is started.
    pub fn start_tick(&self, index: u32) -> Tick {
        (f64::from(index) * self.step_rate).floor() as Tick
    }
}
