use crate::clock::{find_master, Node};
use crate::config::NetworkConfig;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condensed view of the simulation handed to the assistant panel.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SimSummary {
    /// ISO-8601 rendering of the master clock.
    pub master_time: String,
    pub master_time_ms: f64,
    pub slave_count: usize,
    pub base_latency_ms: f64,
    pub jitter_ms: f64,
    /// Mean of |offset| over all slaves, 0 when there are none.
    pub mean_abs_offset_ms: f64,
}

impl Default for SimSummary {
    fn default() -> Self {
        SimSummary {
            master_time: format_time(0.0),
            master_time_ms: 0.0,
            slave_count: 0,
            base_latency_ms: 0.0,
            jitter_ms: 0.0,
            mean_abs_offset_ms: 0.0,
        }
    }
}

impl SimSummary {
    pub fn from_nodes(nodes: &[Node], network: &NetworkConfig) -> Self {
        let master_time_ms = find_master(nodes).map(|m| m.local_time).unwrap_or(0.0);
        let slaves: Vec<&Node> = nodes.iter().filter(|n| !n.is_master).collect();
        let mean_abs_offset_ms = if slaves.is_empty() {
            0.0
        } else {
            slaves.iter().map(|s| s.offset.abs()).sum::<f64>() / slaves.len() as f64
        };

        SimSummary {
            master_time: format_time(master_time_ms),
            master_time_ms,
            slave_count: slaves.len(),
            base_latency_ms: network.base_latency_ms,
            jitter_ms: network.jitter_ms,
            mean_abs_offset_ms,
        }
    }
}

/// Millisecond timestamp as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_time(ms: f64) -> String {
    DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{:.0}ms", ms))
}

impl fmt::Display for SimSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Master Clock Time: {}", self.master_time)?;
        writeln!(f, "Slave Nodes: {}", self.slave_count)?;
        writeln!(f, "Current Network Latency Setting: {}ms", self.base_latency_ms)?;
        writeln!(f, "Current Jitter Setting: {}ms", self.jitter_ms)?;
        write!(f, "Average Slave Offset: {}ms", self.mean_abs_offset_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<Node> {
        let mut a = Node::slave("a", "A", 0.0, 1.0);
        a.offset = -300.0;
        let mut b = Node::slave("b", "B", 0.0, 1.0);
        b.offset = 100.0;
        vec![Node::master("m", "M", 1_700_000_000_000.0), a, b]
    }

    #[test]
    fn test_summary_fields() {
        let summary = SimSummary::from_nodes(&nodes(), &NetworkConfig::default());
        assert_eq!(summary.slave_count, 2);
        assert_eq!(summary.mean_abs_offset_ms, 200.0);
        assert_eq!(summary.base_latency_ms, 50.0);
        assert_eq!(summary.jitter_ms, 5.0);
        assert_eq!(summary.master_time, "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn test_no_slaves() {
        let only = vec![Node::master("m", "M", 0.0)];
        let summary = SimSummary::from_nodes(&only, &NetworkConfig::default());
        assert_eq!(summary.slave_count, 0);
        assert_eq!(summary.mean_abs_offset_ms, 0.0);
    }

    #[test]
    fn test_display_context() {
        let text = SimSummary::from_nodes(&nodes(), &NetworkConfig::default()).to_string();
        assert!(text.contains("Slave Nodes: 2"));
        assert!(text.contains("Current Network Latency Setting: 50ms"));
        assert!(text.contains("Average Slave Offset: 200ms"));
    }

    #[test]
    fn test_json_round_trip() {
        let summary = SimSummary::from_nodes(&nodes(), &NetworkConfig::default());
        let json = serde_json::to_string(&summary).unwrap();
        let back: SimSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
