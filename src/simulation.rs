//! Single-threaded group simulation
//!
//! Every tick runs two phases over all nodes in index order: first each
//! started node picks up what the network holds for it, then each node either
//! starts (on its start tick) or runs one protocol period. Failures and the
//! drop window are applied around those phases. Given the same config, a run
//! is fully reproducible.

use std::{collections::BTreeSet, fmt, sync::Arc};

use gossip_mesh::{
    Clock, EmulNet, EventRecorder, FanoutObserver, ManualClock, MemberRecord, MembershipEvent,
    MembershipEventKind, MembershipNode, NetStats, NodeIdentity, NodeStatus, Tick,
    TracingObserver,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::{FailureMode, SimulationConfig},
    error::{SimulationError, SimulationResult},
};

/// Identity of the `index`-th simulated node; node 0 is the introducer.
pub fn node_identity(index: u32) -> NodeIdentity {
    NodeIdentity::new(index + 1, 0)
}

struct SimNode {
    node: MembershipNode<EmulNet>,
    start_tick: Tick,
}

pub struct Simulation {
    config: SimulationConfig,
    net: EmulNet,
    clock: ManualClock,
    recorder: EventRecorder,
    nodes: Vec<SimNode>,
    rng: StdRng,
    failed: Vec<NodeIdentity>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> SimulationResult<Self> {
        config.validate()?;

        let net = EmulNet::new(config.network.clone());
        let recorder = EventRecorder::new();
        let observer = Arc::new(
            FanoutObserver::new()
                .with(Arc::new(TracingObserver))
                .with(Arc::new(recorder.clone())),
        );

        let mut nodes = Vec::with_capacity(config.nodes as usize);
        for index in 0..config.nodes {
            let identity = node_identity(index);
            let node = MembershipNode::new(
                identity,
                NodeIdentity::bootstrap(),
                net.clone(),
                config.protocol.clone(),
            )
            .map_err(|source| SimulationError::Node {
                node: identity,
                source,
            })?
            .with_observer(observer.clone())
            .with_rng(StdRng::seed_from_u64(config.seed ^ u64::from(identity.host_id)));
            nodes.push(SimNode {
                node,
                start_tick: config.start_tick(index),
            });
        }

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            net,
            clock: ManualClock::new(),
            recorder,
            nodes,
            failed: Vec::new(),
        })
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn network(&self) -> &EmulNet {
        &self.net
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    pub fn node(&self, index: u32) -> Option<&MembershipNode<EmulNet>> {
        self.nodes.get(index as usize).map(|n| &n.node)
    }

    pub fn failed(&self) -> &[NodeIdentity] {
        &self.failed
    }

    /// Run one tick and advance the clock.
    pub fn step(&mut self) -> SimulationResult<()> {
        let now = self.clock.now();

        let drop_probability = match &self.config.drop {
            Some(window) if window.is_active(now) => window.probability,
            _ => 0.0,
        };
        if drop_probability != self.net.drop_probability() {
            debug!(tick = now, drop_probability, "Network loss changed");
            self.net.set_drop_probability(drop_probability);
        }

        for sim in &mut self.nodes {
            sim.node.receive();
        }

        for sim in &mut self.nodes {
            if now == sim.start_tick && sim.node.status() == NodeStatus::Uninitialized {
                let identity = sim.node.identity();
                sim.node
                    .start(now)
                    .map_err(|source| SimulationError::Node {
                        node: identity,
                        source,
                    })?;
            } else if let Some(outcome) = sim.node.node_loop(now) {
                if !outcome.removed.is_empty() {
                    debug!(node = %sim.node.identity(), tick = now, removed = ?outcome.removed, "Sweep removed members");
                }
            }
        }

        if now == self.config.failure_tick {
            self.inject_failures(now);
        }

        self.clock.advance();
        Ok(())
    }

    fn inject_failures(&mut self, now: Tick) {
        let n = self.config.nodes;
        let victims: Vec<u32> = match self.config.failure {
            FailureMode::None => Vec::new(),
            FailureMode::Single => vec![self.rng.random_range(0..n)],
            FailureMode::Multi => {
                let half = n / 2;
                let offset = self.rng.random_range(0..=n - half);
                (offset..offset + half).collect()
            }
        };

        for index in victims {
            let sim = &mut self.nodes[index as usize];
            if sim.node.is_failed() {
                continue;
            }
            warn!(node = %sim.node.identity(), tick = now, "Injecting node failure");
            sim.node.fail();
            self.failed.push(sim.node.identity());
        }
    }

    /// Run the remaining ticks and report the final state.
    pub fn run(mut self) -> SimulationResult<SimulationReport> {
        info!(
            nodes = self.config.nodes,
            ticks = self.config.total_ticks,
            failure = ?self.config.failure,
            "Starting simulation"
        );
        while self.now() < self.config.total_ticks {
            self.step()?;
        }
        let report = self.report();
        info!(converged = report.converged, failed = report.failed.len(), "Simulation finished");
        Ok(report)
    }

    pub fn report(&self) -> SimulationReport {
        let nodes: Vec<NodeReport> = self
            .nodes
            .iter()
            .map(|sim| NodeReport {
                identity: sim.node.identity(),
                status: sim.node.status(),
                start_tick: sim.start_tick,
                heartbeat: sim.node.self_heartbeat(),
                members: sim.node.table().snapshot(),
            })
            .collect();

        let live: BTreeSet<NodeIdentity> = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::InGroup)
            .map(|n| n.identity)
            .collect();
        let converged = !live.is_empty()
            && nodes
                .iter()
                .filter(|n| live.contains(&n.identity))
                .all(|n| n.member_set() == live);

        let failed: BTreeSet<NodeIdentity> = self.failed.iter().copied().collect();
        let lingering = nodes
            .iter()
            .filter(|n| live.contains(&n.identity))
            .flat_map(|n| {
                n.members
                    .iter()
                    .filter(|m| failed.contains(&m.identity))
                    .map(move |m| (n.identity, m.identity))
            })
            .collect();

        SimulationReport {
            ticks: self.now(),
            converged,
            failed: self.failed.clone(),
            lingering,
            nodes,
            events: self.recorder.events(),
            network: self.net.stats(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub identity: NodeIdentity,
    pub status: NodeStatus,
    pub start_tick: Tick,
    pub heartbeat: i64,
    pub members: Vec<MemberRecord>,
}

impl NodeReport {
    pub fn member_set(&self) -> BTreeSet<NodeIdentity> {
        self.members.iter().map(|m| m.identity).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub ticks: Tick,
    /// Every in-group node lists exactly the in-group nodes.
    pub converged: bool,
    pub failed: Vec<NodeIdentity>,
    /// `(observer, subject)` pairs where a live node still lists a failed one.
    pub lingering: Vec<(NodeIdentity, NodeIdentity)>,
    pub nodes: Vec<NodeReport>,
    pub events: Vec<MembershipEvent>,
    pub network: NetStats,
}

impl SimulationReport {
    pub fn events_of(&self, kind: MembershipEventKind) -> impl Iterator<Item = &MembershipEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Simulation finished after {} ticks, converged: {}",
            self.ticks,
            if self.converged { "yes" } else { "no" }
        )?;
        if !self.failed.is_empty() {
            let failed: Vec<String> = self.failed.iter().map(ToString::to_string).collect();
            writeln!(f, "Failed nodes: {}", failed.join(", "))?;
        }
        writeln!(
            f,
            "Network: sent={} received={} dropped={} in_flight={}",
            self.network.total_sent(),
            self.network.total_received(),
            self.network.total_dropped(),
            self.network.in_flight
        )?;
        writeln!(
            f,
            "Events: {} added, {} removed",
            self.events_of(MembershipEventKind::Added).count(),
            self.events_of(MembershipEventKind::Removed).count()
        )?;
        for node in &self.nodes {
            let members: Vec<String> = node
                .members
                .iter()
                .map(|m| format!("{}({})", m.identity, m.heartbeat))
                .collect();
            writeln!(
                f,
                "  {} {:?} heartbeat={} members=[{}]",
                node.identity,
                node.status,
                node.heartbeat,
                members.join(" ")
            )?;
        }
        for (observer, subject) in &self.lingering {
            writeln!(f, "  lingering: {observer} still lists failed {subject}")?;
        }
        Ok(())
    }
}
