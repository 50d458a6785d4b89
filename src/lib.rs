pub mod clock;
pub mod config;
pub mod protocol;
pub mod ptp;
pub mod scheduler;
pub mod status;
pub mod traits;
pub mod transit;

pub use config::SimConfig;
pub use scheduler::{Simulation, Snapshot, TickReport};
