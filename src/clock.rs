//! Simulated clock devices.
//!
//! A [`Node`] is one clock on the simulated network. Exactly one node in a
//! running simulation is the master; its `local_time` is the reference every
//! slave offset is measured against.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Offsets at or below this are shown as locked (ms).
pub const LOCKED_THRESHOLD_MS: f64 = 100.0;
/// Offsets above this are shown as diverged (ms).
pub const DIVERGED_THRESHOLD_MS: f64 = 1_000.0;

/// Where a node sits in its four-message exchange.
///
/// Informational only: packet handling never branches on it, so overlapping
/// rounds are processed exactly as they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncPhase {
    #[default]
    Unsynchronized,
    SyncReceived,
    AwaitingDelayResp,
    Synchronized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub is_master: bool,
    /// Simulated wall-clock reading, ms since the Unix epoch.
    pub local_time: f64,
    /// Rate multiplier: 1.0 is perfect, > 1.0 runs fast.
    pub drift: f64,
    /// Deviation from the master (ms). Always 0 on the master.
    pub offset: f64,
    /// Last one-way delay estimate (ms).
    pub delay: f64,
    pub phase: SyncPhase,
    /// Master time at the last applied correction.
    pub last_sync: Option<f64>,
}

impl Node {
    pub fn master(id: &str, name: &str, local_time: f64) -> Self {
        Node {
            id: id.to_string(),
            name: name.to_string(),
            is_master: true,
            local_time,
            drift: 1.0,
            offset: 0.0,
            delay: 0.0,
            phase: SyncPhase::Synchronized,
            last_sync: None,
        }
    }

    pub fn slave(id: &str, name: &str, local_time: f64, drift: f64) -> Self {
        Node {
            id: id.to_string(),
            name: name.to_string(),
            is_master: false,
            local_time,
            drift,
            offset: 0.0,
            delay: 0.0,
            phase: SyncPhase::Unsynchronized,
            last_sync: None,
        }
    }

    /// Rate error in parts per million.
    pub fn drift_ppm(&self) -> f64 {
        (self.drift - 1.0) * 1_000_000.0
    }

    pub fn health(&self) -> SyncHealth {
        SyncHealth::classify(self)
    }
}

/// Returns the clock reading after `elapsed_ms` of real time.
///
/// Pure: the caller decides whether to write the result back.
pub fn advance(node: &Node, elapsed_ms: f64) -> f64 {
    node.local_time + elapsed_ms * node.drift
}

pub fn find_master(nodes: &[Node]) -> Option<&Node> {
    nodes.iter().find(|n| n.is_master)
}

pub fn master_count(nodes: &[Node]) -> usize {
    nodes.iter().filter(|n| n.is_master).count()
}

/// Coarse display grade of a node's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncHealth {
    Master,
    Locked,
    Drifting,
    Diverged,
}

impl SyncHealth {
    pub fn classify(node: &Node) -> Self {
        if node.is_master {
            return SyncHealth::Master;
        }
        let abs = node.offset.abs();
        if abs > DIVERGED_THRESHOLD_MS {
            SyncHealth::Diverged
        } else if abs > LOCKED_THRESHOLD_MS {
            SyncHealth::Drifting
        } else {
            SyncHealth::Locked
        }
    }
}

impl fmt::Display for SyncHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncHealth::Master => "MASTER",
            SyncHealth::Locked => "LOCK",
            SyncHealth::Drifting => "DRIFT",
            SyncHealth::Diverged => "DIVERGED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_applies_drift() {
        let fast = Node::slave("s", "fast", 1_000.0, 1.0005);
        assert!((advance(&fast, 16.0) - 1_016.008).abs() < 1e-9);

        let slow = Node::slave("s", "slow", 1_000.0, 0.9998);
        assert!((advance(&slow, 1_000.0) - 1_999.8).abs() < 1e-9);
    }

    #[test]
    fn test_advance_is_pure() {
        let node = Node::slave("s", "s", 500.0, 1.0);
        let _ = advance(&node, 16.0);
        assert_eq!(node.local_time, 500.0);
    }

    #[test]
    fn test_drift_ppm() {
        let node = Node::slave("s", "s", 0.0, 1.0005);
        assert!((node.drift_ppm() - 500.0).abs() < 1e-6);
        assert_eq!(Node::master("m", "m", 0.0).drift_ppm(), 0.0);
    }

    #[test]
    fn test_health_bands() {
        let mut node = Node::slave("s", "s", 0.0, 1.0);
        assert_eq!(node.health(), SyncHealth::Locked);

        node.offset = -100.0;
        assert_eq!(node.health(), SyncHealth::Locked);

        node.offset = 250.0;
        assert_eq!(node.health(), SyncHealth::Drifting);

        node.offset = -5_000.0;
        assert_eq!(node.health(), SyncHealth::Diverged);

        let mut master = Node::master("m", "m", 0.0);
        master.offset = 9_999.0;
        assert_eq!(master.health(), SyncHealth::Master);
    }

    #[test]
    fn test_find_master() {
        let nodes = vec![
            Node::slave("a", "a", 0.0, 1.0),
            Node::master("m", "m", 0.0),
        ];
        assert_eq!(find_master(&nodes).map(|n| n.id.as_str()), Some("m"));
        assert_eq!(master_count(&nodes), 1);
        assert!(find_master(&nodes[..1]).is_none());
    }
}
