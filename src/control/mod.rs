//! Runtime configuration - the one piece of state shared across cycles

mod command;

pub use command::*;

use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Smallest RMS window used when a non-positive size was configured
pub const MIN_WINDOW_SIZE: usize = 10;

/// Default cap on the RMS window; commands cannot raise it
pub const DEFAULT_MAX_WINDOW_SIZE: i64 = 10_000;

/// Which physical sensor feeds the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// BMI270 accelerometer + gyroscope
    #[serde(rename = "BMI270")]
    Motion,
    /// BME688 temperature / pressure / humidity / gas
    #[serde(rename = "BME688")]
    Environmental,
}

impl SensorKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            SensorKind::Motion => "BMI270",
            SensorKind::Environmental => "BME688",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "BMI270" => Some(SensorKind::Motion),
            "BME688" => Some(SensorKind::Environmental),
            _ => None,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Transport used for outbound telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "TCP" => Some(Protocol::Tcp),
            "UDP" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// How raw readings are reduced before sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingMode {
    Raw,
    Rms,
    Fft,
    Peak,
}

impl ProcessingMode {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "RAW" => Some(ProcessingMode::Raw),
            "RMS" => Some(ProcessingMode::Rms),
            "FFT" => Some(ProcessingMode::Fft),
            "PEAK" => Some(ProcessingMode::Peak),
            _ => None,
        }
    }
}

/// Runtime-mutable loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub active_sensor: SensorKind,
    pub protocol: Protocol,
    pub processing_mode: ProcessingMode,
    /// Raw value as received; use [`RuntimeConfig::effective_window`]
    pub window_size: i64,
    pub threshold: i64,
    /// Largest window [`RuntimeConfig::effective_window`] will return. Set
    /// from the config file only.
    pub max_window_size: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            active_sensor: SensorKind::Motion,
            protocol: Protocol::Udp,
            processing_mode: ProcessingMode::Raw,
            window_size: 50,
            threshold: 1000,
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Window size coerced into `MIN_WINDOW_SIZE..=max_window_size`
    pub fn effective_window(&self) -> usize {
        let max = usize::try_from(self.max_window_size)
            .unwrap_or(MIN_WINDOW_SIZE)
            .max(MIN_WINDOW_SIZE);
        match usize::try_from(self.window_size) {
            Ok(0) | Err(_) => MIN_WINDOW_SIZE,
            Ok(n) => n.min(max),
        }
    }
}

/// Cloneable handle to the shared [`RuntimeConfig`].
///
/// Readers take a full copy under the lock, writers swap a whole new value in,
/// so a reader never observes half of a command's changes.
#[derive(Debug, Clone, Default)]
pub struct SharedRuntimeConfig {
    inner: Arc<RwLock<RuntimeConfig>>,
}

impl SharedRuntimeConfig {
    pub fn new(initial: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Consistent copy for one loop cycle
    pub fn snapshot(&self) -> RuntimeConfig {
        *self.inner.read()
    }

    /// Apply `f` to a copy and publish it in one write
    pub fn update<F>(&self, f: F) -> RuntimeConfig
    where
        F: FnOnce(&mut RuntimeConfig),
    {
        let mut guard = self.inner.write();
        let mut next = *guard;
        f(&mut next);
        *guard = next;
        next
    }
}
