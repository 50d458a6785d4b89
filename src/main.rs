use anyhow::Result;
use clap::Parser;
use log::info;
use ptpsim::config::SimConfig;
use ptpsim::traits::{DelaySampler, SteppedClock, SystemWallClock, UniformJitter, WallClock};
use ptpsim::Simulation;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base one-way latency in ms (10-500)
    #[arg(short, long)]
    latency: Option<f64>,

    /// Jitter in ms (0-100)
    #[arg(short, long)]
    jitter: Option<f64>,

    /// Stop after this many ticks (runs until Ctrl+C otherwise)
    #[arg(short = 'n', long)]
    ticks: Option<u64>,

    /// Run ticks back to back on simulated time instead of pacing to the host clock
    #[arg(long)]
    fast: bool,

    /// Ticks between status lines
    #[arg(long, default_value_t = 125)]
    status_every: u64,

    /// RNG seed for the jitter sequence
    #[arg(long)]
    seed: Option<u64>,

    /// Print the final snapshot and summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(latency) = args.latency {
        config.network.base_latency_ms = latency;
    }
    if let Some(jitter) = args.jitter {
        config.network.jitter_ms = jitter;
    }
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    config.validate()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let sampler = match config.rng_seed {
        Some(seed) => UniformJitter::seeded(seed),
        None => UniformJitter::new(),
    };

    if args.fast {
        let wall = SteppedClock::new(SystemWallClock.now_ms());
        let handle = wall.clone();
        let tick_ms = config.timing.tick_ms;
        let sim = Simulation::new(config, wall, sampler);
        drive(sim, &args, &running, move || handle.advance(tick_ms))
    } else {
        let pace = Duration::from_secs_f64(config.timing.tick_ms / 1_000.0);
        let sim = Simulation::new(config, SystemWallClock, sampler);
        drive(sim, &args, &running, move || thread::sleep(pace))
    }
}

fn drive<W, D, F>(mut sim: Simulation<W, D>, args: &Args, running: &AtomicBool, mut between_ticks: F) -> Result<()>
where
    W: WallClock,
    D: DelaySampler,
    F: FnMut(),
{
    let net = sim.config().network;
    info!(
        "Simulating {} nodes | Latency: {} ms | Jitter: {} ms | Sync every {} ms",
        sim.nodes().len(),
        net.base_latency_ms,
        net.jitter_ms,
        sim.config().timing.sync_interval_ms
    );

    sim.start();
    while running.load(Ordering::SeqCst) {
        if let Some(limit) = args.ticks {
            if sim.tick_count() >= limit {
                break;
            }
        }

        sim.tick();

        if args.status_every > 0 && sim.tick_count() % args.status_every == 0 {
            sim.log_status();
        }
        between_ticks();
    }
    sim.pause();

    info!("Stopped after {} ticks.", sim.tick_count());
    info!("{}", sim.summary().to_string().replace('\n', " | "));

    if args.json {
        let out = serde_json::json!({
            "snapshot": sim.snapshot(),
            "summary": sim.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}
