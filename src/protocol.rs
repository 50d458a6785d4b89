//! Arrival handling for the two-step exchange.
//!
//! ```text
//!   master                      slave
//!     | --- SYNC ---------------> |   phase: SyncReceived
//!     | --- FOLLOW_UP {t1} -----> |   phase: AwaitingDelayResp
//!     | <-- DELAY_REQ {t1,t2} --- |   timestamp = t3
//!     | --- DELAY_RESP {t1..t4} > |   clock stepped, phase: Synchronized
//! ```
//!
//! `t2` is taken from the FOLLOW_UP timestamp instead of a receive-time
//! capture, and the final correction uses the live master clock rather than
//! the four timestamps. The textbook estimate is still computed and logged.

use crate::clock::{find_master, Node, SyncPhase};
use crate::ptp::{Packet, Payload};
use log::{debug, info};

/// Node set and outgoing packets produced by one arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub nodes: Vec<Node>,
    pub emitted: Vec<Packet>,
}

/// Applies one arrived packet to the node set.
///
/// `sample_delay` is only called for DELAY_RESP. Returns `None` when the
/// packet is dropped (unknown endpoint, missing master, wrong role); the
/// caller must then leave its state untouched.
pub fn on_arrival<F>(packet: &Packet, nodes: &[Node], sample_delay: F) -> Option<Transition>
where
    F: FnOnce() -> f64,
{
    let Some(idx) = nodes.iter().position(|n| n.id == packet.to_id) else {
        debug!(
            "Dropping {} {}: target '{}' not found",
            packet.kind(),
            packet.id,
            packet.to_id
        );
        return None;
    };
    let target = &nodes[idx];

    match packet.payload {
        Payload::Sync => {
            if target.is_master {
                return drop_wrong_role(packet);
            }
            let mut next = nodes.to_vec();
            next[idx].phase = SyncPhase::SyncReceived;
            debug!("[{}] SYNC received", target.id);
            Some(Transition {
                nodes: next,
                emitted: Vec::new(),
            })
        }
        Payload::FollowUp { t1 } => {
            if target.is_master {
                return drop_wrong_role(packet);
            }
            let t2 = packet.timestamp;
            let t3 = target.local_time;
            let request = Packet::new(&target.id, &packet.from_id, t3, Payload::DelayReq { t1, t2 });
            debug!(
                "[{}] FOLLOW_UP t1={:.3}, sending DELAY_REQ t3={:.3}",
                target.id, t1, t3
            );

            let mut next = nodes.to_vec();
            next[idx].phase = SyncPhase::AwaitingDelayResp;
            Some(Transition {
                nodes: next,
                emitted: vec![request],
            })
        }
        Payload::DelayReq { t1, t2 } => {
            let Some(master) = find_master(nodes) else {
                debug!("Dropping DELAY_REQ {}: no master", packet.id);
                return None;
            };
            if master.id != target.id {
                return drop_wrong_role(packet);
            }
            let t3 = packet.timestamp;
            let t4 = master.local_time;
            let response = Packet::new(
                &master.id,
                &packet.from_id,
                t4,
                Payload::DelayResp { t1, t2, t3, t4 },
            );
            debug!(
                "[{}] DELAY_REQ from {}, sending DELAY_RESP t4={:.3}",
                master.id, packet.from_id, t4
            );
            Some(Transition {
                nodes: nodes.to_vec(),
                emitted: vec![response],
            })
        }
        Payload::DelayResp { .. } => {
            if target.is_master {
                return drop_wrong_role(packet);
            }
            let Some(master) = find_master(nodes) else {
                debug!("Dropping DELAY_RESP {}: no master", packet.id);
                return None;
            };
            let master_time = master.local_time;
            let true_offset = target.local_time - master_time;
            let network_delay = sample_delay();
            let correction = -true_offset;

            if let Some(est) = packet.payload.path_estimate() {
                debug!(
                    "[{}] Timestamp estimate: offset {:.3} ms, mean path delay {:.3} ms",
                    target.id, est.offset, est.mean_path_delay
                );
            }
            info!(
                "[{}] Stepping clock by {:+.3} ms (delay {:.2} ms)",
                target.id, correction, network_delay
            );

            let mut next = nodes.to_vec();
            let slave = &mut next[idx];
            slave.local_time += correction;
            slave.offset = 0.0;
            slave.delay = network_delay;
            slave.drift = 1.0;
            slave.phase = SyncPhase::Synchronized;
            slave.last_sync = Some(master_time);
            Some(Transition {
                nodes: next,
                emitted: Vec::new(),
            })
        }
    }
}

fn drop_wrong_role(packet: &Packet) -> Option<Transition> {
    debug!(
        "Dropping {} {}: '{}' cannot handle it",
        packet.kind(),
        packet.id,
        packet.to_id
    );
    None
}
