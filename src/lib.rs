//! Deterministic simulator for the gossip membership protocol.
//!
//! Runs a whole group of [`gossip_mesh::MembershipNode`]s over one
//! [`gossip_mesh::EmulNet`] on a single thread, injects failures and message
//! loss, and reports what every node believes at the end.

pub mod config;
pub mod error;
pub mod logging;
pub mod simulation;

pub use config::{DropWindow, FailureMode, SimulationConfig};
pub use error::{SimConfigError, SimulationError, SimulationResult};
pub use simulation::{NodeReport, Simulation, SimulationReport};
