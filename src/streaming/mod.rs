//! Streaming module - telemetry records and the control/stream network session

mod session;

pub use session::*;

use serde::{Deserialize, Serialize};

use crate::control::{ProcessingMode, SensorKind};
use crate::processing::RmsSummary;
use crate::sensors::Reading;

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Collector host for both channels
    pub server_host: String,
    /// TCP control port
    pub control_port: u16,
    /// UDP streaming port
    pub stream_port: u16,
    pub connect_timeout_ms: u64,
    /// Wait before reconnecting the control channel after a failure
    pub reconnect_backoff_ms: u64,
    /// Largest control message held without a newline
    pub rx_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_host: "192.168.1.100".to_string(),
            control_port: 1234,
            stream_port: 1234,
            connect_timeout_ms: 5000,
            reconnect_backoff_ms: 3000,
            rx_buffer_size: 256,
        }
    }
}

/// Record body, keyed the way the collector expects
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Environmental {
        temp: f32,
        press: f32,
        hum: f32,
        gas: f32,
    },
    Motion {
        ax: f32,
        ay: f32,
        az: f32,
        gx: f32,
        gy: f32,
        gz: f32,
    },
    Rms {
        rms: f32,
        #[serde(rename = "N")]
        n: usize,
    },
}

/// One outbound telemetry line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub sensor: SensorKind,
    #[serde(rename = "type")]
    pub mode: ProcessingMode,
    #[serde(flatten)]
    pub payload: Payload,
}

impl TelemetryRecord {
    /// RAW record for a single reading
    pub fn from_reading(reading: &Reading) -> Self {
        let payload = match *reading {
            Reading::Environmental {
                temperature_c,
                pressure_pa,
                humidity_pct,
                gas_resistance_ohm,
            } => Payload::Environmental {
                temp: temperature_c,
                press: pressure_pa,
                hum: humidity_pct,
                gas: gas_resistance_ohm,
            },
            Reading::Motion { ax, ay, az, gx, gy, gz } => Payload::Motion { ax, ay, az, gx, gy, gz },
        };
        Self {
            sensor: reading.kind(),
            mode: ProcessingMode::Raw,
            payload,
        }
    }

    pub fn rms(sensor: SensorKind, summary: RmsSummary) -> Self {
        Self {
            sensor,
            mode: ProcessingMode::Rms,
            payload: Payload::Rms {
                rms: summary.rms,
                n: summary.samples,
            },
        }
    }

    /// Newline-terminated JSON
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}
