// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! edgelink - Edge Telemetry Bridge
//!
//! Reads a BME688 environmental sensor and a BMI270 IMU over I2C, compensates
//! the raw ADC codes, and streams JSON records to a collector over a
//! runtime-switchable TCP/UDP link:
//! - Forced-mode BME688 acquisition with bounded status polling
//! - Datasheet calibration decode and floating-point compensation
//! - RAW and windowed RMS processing modes
//! - Line-delimited JSON control commands applied between cycles
//! - Control-channel reconnect with fixed backoff
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        edgelink Engine                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐ │
//! │  │ Sensors │ → │ Processing │ → │ Telemetry │ → │ TCP/UDP  │ │
//! │  │ Manager │   │ Pipeline   │   │ Record    │   │ Session  │ │
//! │  └─────────┘   └────────────┘   └───────────┘   └──────────┘ │
//! │       ↑              ↑                               │       │
//! │  ┌─────────┐   ┌────────────────────┐                │       │
//! │  │ I2C bus │   │ SharedRuntimeConfig│ ← CommandChannel ←┘    │
//! │  └─────────┘   └────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod processing;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use config::Config;
pub use control::{CommandChannel, RuntimeConfig, SharedRuntimeConfig};
pub use core::{Engine, TokioDelay};
pub use error::{AcquisitionError, ProcessingError, SessionError};
pub use sensors::{Reading, SensorManager};
pub use streaming::{TelemetryRecord, TelemetrySession, TokioConnector};

/// edgelink version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// edgelink name
pub const NAME: &str = "edgelink";
