use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;
use std::rc::Rc;

/// Host wall clock polled by the scheduler for sync-round timing.
#[cfg_attr(test, mockall::automock)]
pub trait WallClock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> f64;
}

/// Source of one-way network delay samples.
#[cfg_attr(test, mockall::automock)]
pub trait DelaySampler {
    /// Returns a delay in `[base_latency_ms - jitter_ms, base_latency_ms + jitter_ms]`.
    fn sample(&mut self, base_latency_ms: f64, jitter_ms: f64) -> f64;
}

pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_ms(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64
    }
}

/// Wall clock that only moves when told to.
///
/// Clones share the same reading, so a driver can keep a handle while the
/// simulation owns another.
#[derive(Debug, Clone, Default)]
pub struct SteppedClock {
    now_ms: Rc<Cell<f64>>,
}

impl SteppedClock {
    pub fn new(start_ms: f64) -> Self {
        SteppedClock {
            now_ms: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: f64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.now_ms.set(ms);
    }
}

impl WallClock for SteppedClock {
    fn now_ms(&self) -> f64 {
        self.now_ms.get()
    }
}

/// Uniform `base ± jitter` delay generator.
pub struct UniformJitter {
    rng: StdRng,
}

impl UniformJitter {
    pub fn new() -> Self {
        UniformJitter {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence for replays.
    pub fn seeded(seed: u64) -> Self {
        UniformJitter {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for UniformJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl DelaySampler for UniformJitter {
    fn sample(&mut self, base_latency_ms: f64, jitter_ms: f64) -> f64 {
        if jitter_ms <= 0.0 {
            return base_latency_ms;
        }
        base_latency_ms + self.rng.random_range(-jitter_ms..=jitter_ms)
    }
}
