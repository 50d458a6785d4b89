//! Packet movement along the simulated links.

use crate::ptp::Packet;

/// Progress per tick at the reference latency.
pub const PACKET_SPEED: f64 = 0.02;
/// Latency at which a packet moves at exactly [`PACKET_SPEED`].
pub const REFERENCE_LATENCY_MS: f64 = 50.0;
/// Latencies below this move no faster than at this value.
pub const MIN_LATENCY_MS: f64 = 10.0;

/// Result of moving every in-flight packet one tick.
#[derive(Debug, Default)]
pub struct Transit {
    pub in_flight: Vec<Packet>,
    /// Packets that reached their destination, in insertion order.
    pub arrived: Vec<Packet>,
}

/// Per-tick progress increment for a configured base latency.
///
/// Higher latency means slower traversal so the animation stays readable
/// across the whole 10..=500 ms range.
pub fn progress_step(latency_ms: f64) -> f64 {
    PACKET_SPEED * (REFERENCE_LATENCY_MS / latency_ms.max(MIN_LATENCY_MS))
}

/// Moves every packet forward and splits off those that arrived.
///
/// Arrived packets have their progress pinned to 1.
pub fn advance_all(packets: Vec<Packet>, latency_ms: f64) -> Transit {
    let step = progress_step(latency_ms);
    let mut transit = Transit::default();

    for mut packet in packets {
        packet.progress += step;
        if packet.has_arrived() {
            packet.progress = 1.0;
            transit.arrived.push(packet);
        } else {
            transit.in_flight.push(packet);
        }
    }

    transit
}
