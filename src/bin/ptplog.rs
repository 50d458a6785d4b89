//! Deterministic PTP exchange logger - prints every packet arrival of a simulated run

use clap::Parser;
use ptpsim::config::SimConfig;
use ptpsim::ptp::PacketType;
use ptpsim::traits::{SteppedClock, UniformJitter, WallClock, SystemWallClock};
use ptpsim::Simulation;
use std::collections::HashMap;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the packet trace of a simulated PTP run")]
struct Args {
    /// Number of ticks to simulate
    #[arg(short = 'n', long, default_value_t = 500)]
    ticks: u64,

    /// Base one-way latency in ms
    #[arg(short, long, default_value_t = 50.0)]
    latency: f64,

    /// Jitter in ms
    #[arg(short, long, default_value_t = 5.0)]
    jitter: f64,

    /// RNG seed for the jitter sequence
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Epoch in ms (defaults to now)
    #[arg(short, long)]
    epoch: Option<f64>,
}

fn main() {
    let args = Args::parse();

    let mut config = SimConfig::default();
    config.network.base_latency_ms = args.latency;
    config.network.jitter_ms = args.jitter;
    let tick_ms = config.timing.tick_ms;

    let epoch = args.epoch.unwrap_or_else(|| SystemWallClock.now_ms());
    let wall = SteppedClock::new(epoch);
    let mut sim = Simulation::new(config, wall.clone(), UniformJitter::seeded(args.seed));

    println!("=== PTP Exchange Trace ===\n");
    println!(
        "{:>6} {:>11} {:>10} {:>10} {:>7} {:>14}",
        "Tick", "Type", "From", "To", "Status", "Offset (ms)"
    );
    println!("{}", "-".repeat(64));

    // slave id -> offsets seen just before each correction
    let mut corrections: HashMap<String, Vec<f64>> = HashMap::new();

    for _ in 0..args.ticks {
        let before: HashMap<String, f64> = sim
            .nodes()
            .iter()
            .map(|n| (n.id.clone(), n.offset))
            .collect();

        let report = sim.step();
        wall.advance(tick_ms);

        for arrival in &report.arrivals {
            let status = if arrival.handled { "ok" } else { "drop" };
            let offset = match arrival.kind {
                PacketType::DelayResp if arrival.handled => {
                    let pre = before.get(&arrival.to_id).copied().unwrap_or(0.0);
                    corrections.entry(arrival.to_id.clone()).or_default().push(pre);
                    format!("{:+.3} -> 0", pre)
                }
                _ => String::new(),
            };
            println!(
                "{:>6} {:>11} {:>10} {:>10} {:>7} {:>14}",
                report.tick,
                arrival.kind.as_str(),
                arrival.from_id,
                arrival.to_id,
                status,
                offset
            );
        }
    }

    println!("\n{}", "=".repeat(64));
    let mut ids: Vec<_> = corrections.keys().cloned().collect();
    ids.sort();
    for id in ids {
        let offsets = &corrections[&id];
        let max = offsets.iter().fold(0.0_f64, |acc, o| acc.max(o.abs()));
        println!(
            "  {:<10} {} corrections, largest step {:.3} ms",
            id,
            offsets.len(),
            max
        );
    }
    for node in sim.nodes() {
        println!(
            "  {:<10} offset {:+.3} ms, delay {:.2} ms",
            node.id, node.offset, node.delay
        );
    }

    println!("\n=== Done ===");
}
