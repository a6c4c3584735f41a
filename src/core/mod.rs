//! Core module - the acquisition/telemetry loop and its timing primitives

pub mod clock;
mod engine;

pub use clock::{Delay, TokioDelay};
pub use engine::{CycleOutcome, Engine, TimingConfig};

use serde::{Deserialize, Serialize};

/// Loop counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub sensors_active: usize,
    pub cycles: u64,
    pub records_sent: u64,
    pub cycle_failures: u64,
    pub reconnects: u64,
    pub uptime_seconds: u64,
}
