use std::path::PathBuf;

use gossip_mesh::{ConfigError, ProtocolError};
use thiserror::Error;

pub type SimulationResult<T> = Result<T, SimulationError>;

#[derive(Debug, Error)]
pub enum SimConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("A simulation needs at least one node")]
    NoNodes,

    #[error("Step rate must be a finite non-negative number, got {0}")]
    InvalidStepRate(f64),

    #[error("Drop probability must be within [0, 1], got {0}")]
    InvalidDropProbability(f64),

    #[error("Drop window is empty: start {start} >= end {end}")]
    InvalidDropWindow { start: u64, end: u64 },

    #[error(transparent)]
    Protocol(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] SimConfigError),

    #[error("Node {node} failed: {source}")]
    Node {
        node: gossip_mesh::NodeIdentity,
        #[source]
        source: ProtocolError,
    },
}
