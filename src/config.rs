use crate::clock::Node;
use crate::ptp::FOLLOW_UP_STAGGER;
use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const MIN_BASE_LATENCY_MS: f64 = 10.0;
pub const MAX_BASE_LATENCY_MS: f64 = 500.0;
pub const MAX_JITTER_MS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub nodes: Vec<NodeSeed>,
    /// Fixes the jitter sequence for reproducible runs.
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub base_latency_ms: f64,
    pub jitter_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Simulated time added per tick (ms).
    pub tick_ms: f64,
    /// Wall-clock gap between SYNC rounds (ms).
    pub sync_interval_ms: f64,
    /// Starting progress of each FOLLOW_UP.
    pub follow_up_stagger: f64,
}

/// Initial state of one node, relative to the reset epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_master: bool,
    /// Added to the epoch to form the starting `local_time`.
    #[serde(default)]
    pub time_offset_ms: f64,
    #[serde(default = "NodeSeed::default_drift")]
    pub drift: f64,
}

impl NodeSeed {
    fn default_drift() -> f64 {
        1.0
    }

    pub fn to_node(&self, epoch_ms: f64) -> Node {
        let local_time = epoch_ms + self.time_offset_ms;
        if self.is_master {
            let mut node = Node::master(&self.id, &self.name, local_time);
            node.drift = self.drift;
            node
        } else {
            Node::slave(&self.id, &self.name, local_time, self.drift)
        }
    }
}

pub fn seed_nodes(seeds: &[NodeSeed], epoch_ms: f64) -> Vec<Node> {
    seeds.iter().map(|s| s.to_node(epoch_ms)).collect()
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            network: NetworkConfig::default(),
            timing: TimingConfig::default(),
            nodes: SimConfig::default_nodes(),
            rng_seed: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            base_latency_ms: 50.0,
            jitter_ms: 5.0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            tick_ms: 16.0,
            sync_interval_ms: 2_000.0,
            follow_up_stagger: FOLLOW_UP_STAGGER,
        }
    }
}

impl SimConfig {
    /// One grandmaster and two slaves: one far behind and fast, one ahead and slow.
    pub fn default_nodes() -> Vec<NodeSeed> {
        vec![
            NodeSeed {
                id: "master".to_string(),
                name: "Grandmaster Clock".to_string(),
                is_master: true,
                time_offset_ms: 0.0,
                drift: 1.0,
            },
            NodeSeed {
                id: "slave-1".to_string(),
                name: "IoT Sensor A (WiFi)".to_string(),
                is_master: false,
                time_offset_ms: -5_000.0,
                drift: 1.0005,
            },
            NodeSeed {
                id: "slave-2".to_string(),
                name: "Edge Server B".to_string(),
                is_master: false,
                time_offset_ms: 2_000.0,
                drift: 0.9998,
            },
        ]
    }

    /// Loads a JSON config. Missing fields fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: SimConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let masters = self.nodes.iter().filter(|n| n.is_master).count();
        if masters != 1 {
            bail!("Expected exactly one master node, found {}", masters);
        }

        let mut ids = HashSet::new();
        for seed in &self.nodes {
            if !ids.insert(seed.id.as_str()) {
                bail!("Duplicate node id '{}'", seed.id);
            }
            if !seed.drift.is_finite() || seed.drift <= 0.0 {
                bail!("Node '{}' has invalid drift {}", seed.id, seed.drift);
            }
            if !seed.time_offset_ms.is_finite() {
                bail!("Node '{}' has non-finite time offset", seed.id);
            }
        }

        let t = &self.timing;
        if !(t.tick_ms.is_finite() && t.tick_ms > 0.0) {
            return Err(anyhow!("tick_ms must be > 0, got {}", t.tick_ms));
        }
        if !(t.sync_interval_ms.is_finite() && t.sync_interval_ms > 0.0) {
            return Err(anyhow!(
                "sync_interval_ms must be > 0, got {}",
                t.sync_interval_ms
            ));
        }
        if !t.follow_up_stagger.is_finite() || t.follow_up_stagger >= 1.0 {
            return Err(anyhow!(
                "follow_up_stagger must be < 1, got {}",
                t.follow_up_stagger
            ));
        }
        Ok(())
    }
}

impl NetworkConfig {
    /// Pulls both settings into their supported ranges.
    pub fn clamped(self) -> Self {
        NetworkConfig {
            base_latency_ms: clamp_latency(self.base_latency_ms),
            jitter_ms: clamp_jitter(self.jitter_ms),
        }
    }
}

pub fn clamp_latency(ms: f64) -> f64 {
    clamp_setting("base_latency_ms", ms, MIN_BASE_LATENCY_MS, MAX_BASE_LATENCY_MS)
}

pub fn clamp_jitter(ms: f64) -> f64 {
    clamp_setting("jitter_ms", ms, 0.0, MAX_JITTER_MS)
}

fn clamp_setting(name: &str, value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        warn!("{} is NaN, using {}", name, min);
        return min;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("{} {} out of range, clamped to {}", name, value, clamped);
    }
    clamped
}
