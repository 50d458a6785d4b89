use crate::clock::{self, find_master, Node};
use crate::config::{clamp_jitter, clamp_latency, seed_nodes, SimConfig};
use crate::protocol;
use crate::ptp::{Packet, PacketType, Payload};
use crate::status::SimSummary;
use crate::traits::{DelaySampler, SystemWallClock, UniformJitter, WallClock};
use crate::transit;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only view handed to renderers after each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub nodes: Vec<Node>,
    pub packets: Vec<Packet>,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub arrivals: Vec<ArrivalRecord>,
    /// A new SYNC/FOLLOW_UP round left the master this tick.
    pub round_started: bool,
}

#[derive(Debug, Clone)]
pub struct ArrivalRecord {
    pub packet_id: Uuid,
    pub kind: PacketType,
    pub from_id: String,
    pub to_id: String,
    /// False if the packet was dropped.
    pub handled: bool,
    pub emitted: Vec<PacketType>,
}

/// Owns the node set, the in-flight packets and the round timer.
///
/// Each tick runs, in order: packet transit, arrival handling, clock
/// advance, sync-round emission.
pub struct Simulation<W, D>
where
    W: WallClock,
    D: DelaySampler,
{
    config: SimConfig,
    wall: W,
    sampler: D,

    nodes: Vec<Node>,
    packets: Vec<Packet>,
    last_round_ms: Option<f64>,
    running: bool,
    tick_count: u64,
}

impl Simulation<SystemWallClock, UniformJitter> {
    /// Host clock for round timing, OS-seeded jitter unless the config fixes a seed.
    pub fn with_system_clock(config: SimConfig) -> Self {
        let sampler = match config.rng_seed {
            Some(seed) => UniformJitter::seeded(seed),
            None => UniformJitter::new(),
        };
        Simulation::new(config, SystemWallClock, sampler)
    }
}

impl<W, D> Simulation<W, D>
where
    W: WallClock,
    D: DelaySampler,
{
    /// Seeds the nodes against the current wall-clock reading. Starts paused.
    pub fn new(mut config: SimConfig, wall: W, sampler: D) -> Self {
        config.network = config.network.clamped();
        let nodes = seed_nodes(&config.nodes, wall.now_ms());
        if clock::master_count(&nodes) != 1 {
            warn!(
                "Seed list has {} masters; master-dependent steps will be skipped",
                clock::master_count(&nodes)
            );
        }
        Simulation {
            config,
            wall,
            sampler,
            nodes,
            packets: Vec::new(),
            last_round_ms: None,
            running: false,
            tick_count: 0,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick_count,
            nodes: self.nodes.clone(),
            packets: self.packets.clone(),
        }
    }

    pub fn summary(&self) -> SimSummary {
        SimSummary::from_nodes(&self.nodes, &self.config.network)
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn toggle(&mut self) {
        self.running = !self.running;
    }

    pub fn set_base_latency(&mut self, ms: f64) {
        self.config.network.base_latency_ms = clamp_latency(ms);
    }

    pub fn set_jitter(&mut self, ms: f64) {
        self.config.network.jitter_ms = clamp_jitter(ms);
    }

    /// Stops the run and reseeds every node against the current wall clock.
    pub fn reset(&mut self) {
        self.running = false;
        self.packets.clear();
        self.last_round_ms = None;
        self.tick_count = 0;
        self.nodes = seed_nodes(&self.config.nodes, self.wall.now_ms());
        info!("Simulation reset ({} nodes)", self.nodes.len());
    }

    /// Runs one tick if the simulation is running.
    pub fn tick(&mut self) -> Option<TickReport> {
        if !self.running {
            return None;
        }
        Some(self.step())
    }

    /// Runs exactly one tick regardless of the run flag.
    pub fn step(&mut self) -> TickReport {
        self.tick_count += 1;
        let mut report = TickReport {
            tick: self.tick_count,
            ..Default::default()
        };

        self.deliver_packets(&mut report);
        self.advance_clocks();
        report.round_started = self.maybe_start_round();

        report
    }

    fn deliver_packets(&mut self, report: &mut TickReport) {
        let packets = std::mem::take(&mut self.packets);
        let transit = transit::advance_all(packets, self.config.network.base_latency_ms);
        self.packets = transit.in_flight;

        let base = self.config.network.base_latency_ms;
        let jitter = self.config.network.jitter_ms;
        for packet in transit.arrived {
            let sampler = &mut self.sampler;
            let outcome = protocol::on_arrival(&packet, &self.nodes, || sampler.sample(base, jitter));

            let mut record = ArrivalRecord {
                packet_id: packet.id,
                kind: packet.kind(),
                from_id: packet.from_id.clone(),
                to_id: packet.to_id.clone(),
                handled: outcome.is_some(),
                emitted: Vec::new(),
            };
            if let Some(transition) = outcome {
                self.nodes = transition.nodes;
                record.emitted = transition.emitted.iter().map(Packet::kind).collect();
                self.packets.extend(transition.emitted);
            }
            report.arrivals.push(record);
        }
    }

    fn advance_clocks(&mut self) {
        let tick_ms = self.config.timing.tick_ms;
        let Some(master) = find_master(&self.nodes) else {
            warn!("No master node; clocks not advanced");
            return;
        };
        let master_time = clock::advance(master, tick_ms);

        for node in &mut self.nodes {
            node.local_time = clock::advance(node, tick_ms);
            node.offset = if node.is_master {
                0.0
            } else {
                node.local_time - master_time
            };
        }
    }

    fn maybe_start_round(&mut self) -> bool {
        let now = self.wall.now_ms();
        if let Some(last) = self.last_round_ms {
            if now - last <= self.config.timing.sync_interval_ms {
                return false;
            }
        }

        let Some(master) = find_master(&self.nodes) else {
            warn!("No master node; skipping sync round");
            return false;
        };

        let t1 = master.local_time;
        let stagger = self.config.timing.follow_up_stagger;
        let mut round = Vec::new();
        for slave in self.nodes.iter().filter(|n| !n.is_master) {
            round.push(Packet::new(&master.id, &slave.id, t1, Payload::Sync));
            round.push(
                Packet::new(&master.id, &slave.id, t1, Payload::FollowUp { t1 }).with_progress(stagger),
            );
        }
        debug!("Sync round at t1={:.3}: {} packets", t1, round.len());

        self.packets.extend(round);
        self.last_round_ms = Some(now);
        true
    }

    /// Logs one `[Status]` line per node.
    pub fn log_status(&self) {
        for node in &self.nodes {
            if node.is_master {
                info!(
                    "[Status] {} ({}) | Time: {}",
                    node.name,
                    node.health(),
                    crate::status::format_time(node.local_time)
                );
            } else {
                info!(
                    "[Status] {} ({}) | Offset: {:+.2} ms | Delay: {:.2} ms | Drift: {:+.1} ppm | {:?}",
                    node.name,
                    node.health(),
                    node.offset,
                    node.delay,
                    node.drift_ppm(),
                    node.phase
                );
            }
        }
        debug!("[Status] {} packets in flight", self.packets.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SyncPhase;
    use crate::config::NodeSeed;
    use crate::traits::{MockDelaySampler, MockWallClock, SteppedClock};
    use mockall::predicate::*;

    const EPOCH: f64 = 1_000_000.0;

    fn fixed_wall(ms: f64) -> MockWallClock {
        let mut wall = MockWallClock::new();
        wall.expect_now_ms().returning(move || ms);
        wall
    }

    fn quiet_sampler() -> MockDelaySampler {
        let mut sampler = MockDelaySampler::new();
        sampler.expect_sample().returning(|base, _| base);
        sampler
    }

    #[test]
    fn test_starts_paused_and_seeded() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sim = Simulation::new(SimConfig::default(), fixed_wall(EPOCH), quiet_sampler());

        assert!(!sim.is_running());
        assert_eq!(sim.nodes().len(), 3);
        assert_eq!(sim.node("slave-1").unwrap().local_time, EPOCH - 5_000.0);
        assert!(sim.packets().is_empty());
    }

    #[test]
    fn test_first_step_emits_round() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut sim = Simulation::new(SimConfig::default(), fixed_wall(EPOCH), quiet_sampler());

        let report = sim.step();
        assert!(report.round_started);
        assert!(report.arrivals.is_empty());

        let kinds: Vec<_> = sim.packets().iter().map(|p| (p.kind(), p.to_id.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (PacketType::Sync, "slave-1"),
                (PacketType::FollowUp, "slave-1"),
                (PacketType::Sync, "slave-2"),
                (PacketType::FollowUp, "slave-2"),
            ]
        );
        let master_time = sim.node("master").unwrap().local_time;
        for p in sim.packets() {
            assert_eq!(p.timestamp, master_time);
            match p.payload {
                Payload::FollowUp { t1 } => {
                    assert_eq!(t1, master_time);
                    assert_eq!(p.progress, -0.05);
                }
                _ => assert_eq!(p.progress, 0.0),
            }
        }
    }

    #[test]
    fn test_round_interval_is_polled() {
        let wall = SteppedClock::new(EPOCH);
        let mut sim = Simulation::new(SimConfig::default(), wall.clone(), quiet_sampler());

        assert!(sim.step().round_started);
        wall.advance(2_000.0);
        assert!(!sim.step().round_started, "interval must be exceeded, not met");
        wall.advance(1.0);
        assert!(sim.step().round_started);
    }

    #[test]
    fn test_clock_advance_and_display_offset() {
        let mut sim = Simulation::new(SimConfig::default(), fixed_wall(EPOCH), quiet_sampler());
        sim.step();

        let master = sim.node("master").unwrap();
        assert_eq!(master.local_time, EPOCH + 16.0);
        assert_eq!(master.offset, 0.0);

        let s1 = sim.node("slave-1").unwrap();
        let expected = EPOCH - 5_000.0 + 16.0 * 1.0005;
        assert!((s1.local_time - expected).abs() < 1e-6);
        assert!((s1.offset - (expected - (EPOCH + 16.0))).abs() < 1e-6);
    }

    #[test]
    fn test_paused_tick_is_noop() {
        let mut sim = Simulation::new(SimConfig::default(), fixed_wall(EPOCH), quiet_sampler());
        sim.start();
        for _ in 0..10 {
            sim.tick();
        }
        sim.pause();
        let frozen = sim.snapshot();
        for _ in 0..1_000 {
            assert!(sim.tick().is_none());
        }
        assert_eq!(sim.snapshot(), frozen);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut sim = Simulation::new(SimConfig::default(), fixed_wall(EPOCH), quiet_sampler());
        let seeded = sim.nodes().to_vec();
        sim.start();
        for _ in 0..300 {
            sim.tick();
        }
        assert_ne!(sim.nodes(), seeded.as_slice());

        sim.reset();
        let first = sim.snapshot();
        sim.reset();
        assert_eq!(sim.snapshot(), first);
        assert_eq!(first.nodes, seeded);
        assert!(first.packets.is_empty());
        assert!(!sim.is_running());
        assert_eq!(sim.tick_count(), 0);
    }

    #[test]
    fn test_delay_sampled_with_live_settings() {
        let mut sampler = MockDelaySampler::new();
        sampler
            .expect_sample()
            .with(eq(120.0), eq(0.0))
            .times(2)
            .returning(|base, _| base);

        let mut config = SimConfig::default();
        config.network.jitter_ms = 0.0;
        let mut sim = Simulation::new(config, fixed_wall(EPOCH), sampler);
        sim.set_base_latency(120.0);

        // One round, 120ms latency: well under one sync interval of ticks.
        for _ in 0..400 {
            sim.step();
        }
        for id in ["slave-1", "slave-2"] {
            assert_eq!(sim.node(id).unwrap().delay, 120.0);
        }
    }

    #[test]
    fn test_settings_clamped() {
        let mut sim = Simulation::new(SimConfig::default(), fixed_wall(EPOCH), quiet_sampler());
        sim.set_base_latency(1.0);
        sim.set_jitter(500.0);
        assert_eq!(sim.config().network.base_latency_ms, 10.0);
        assert_eq!(sim.config().network.jitter_ms, 100.0);
    }

    #[test]
    fn test_missing_master_degrades() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut config = SimConfig::default();
        config.nodes = vec![NodeSeed {
            id: "lonely".to_string(),
            name: "Lonely".to_string(),
            is_master: false,
            time_offset_ms: 0.0,
            drift: 1.0,
        }];
        let mut sim = Simulation::new(config, fixed_wall(EPOCH), quiet_sampler());

        let report = sim.step();
        assert!(!report.round_started);
        assert!(sim.packets().is_empty());
        assert_eq!(sim.nodes()[0].local_time, EPOCH);
    }

    #[test]
    fn test_phases_progress_through_round() {
        let mut config = SimConfig::default();
        config.nodes.truncate(2);
        let mut sim = Simulation::new(config, fixed_wall(EPOCH), quiet_sampler());

        let mut seen = vec![sim.node("slave-1").unwrap().phase];
        for _ in 0..400 {
            sim.step();
            let phase = sim.node("slave-1").unwrap().phase;
            if seen.last() != Some(&phase) {
                seen.push(phase);
            }
        }
        assert_eq!(
            seen,
            vec![
                SyncPhase::Unsynchronized,
                SyncPhase::SyncReceived,
                SyncPhase::AwaitingDelayResp,
                SyncPhase::Synchronized,
            ]
        );
    }
}
