// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sensor traits and common types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::control::SensorKind;
use crate::error::Result;

/// Sensor operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorStatus {
    Uninitialized,
    Active,
    /// Needs a new init sequence before it can be read again
    Faulted,
}

/// One converted measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Environmental {
        temperature_c: f32,
        pressure_pa: f32,
        humidity_pct: f32,
        gas_resistance_ohm: f32,
    },
    /// Acceleration in m/s², angular rate in rad/s
    Motion {
        ax: f32,
        ay: f32,
        az: f32,
        gx: f32,
        gy: f32,
        gz: f32,
    },
}

impl Reading {
    pub fn kind(&self) -> SensorKind {
        match self {
            Reading::Environmental { .. } => SensorKind::Environmental,
            Reading::Motion { .. } => SensorKind::Motion,
        }
    }
}

/// Uniform read contract for every device on the bus
#[async_trait]
pub trait SensorSource: Send {
    /// Which sensor this is
    fn kind(&self) -> SensorKind;

    /// Current driver status
    fn status(&self) -> SensorStatus;

    /// Probe the chip and bring it into a readable state
    async fn initialize(&mut self) -> Result<()>;

    /// Acquire one reading. Re-runs initialization first if the driver is not active.
    async fn read(&mut self) -> Result<Reading>;
}

/// Running read statistics for one sensor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorHealth {
    pub readings_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub last_reading: Option<chrono::DateTime<chrono::Utc>>,
}

impl SensorHealth {
    pub fn record_success(&mut self) {
        self.readings_count += 1;
        self.consecutive_errors = 0;
        self.last_reading = Some(chrono::Utc::now());
    }

    pub fn record_error(&mut self, error: &crate::error::AcquisitionError) {
        self.error_count += 1;
        self.consecutive_errors += 1;
        self.last_error = Some(error.to_string());
    }
}
