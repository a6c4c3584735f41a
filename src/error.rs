// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Error types for acquisition, processing and the network session

use thiserror::Error;

use crate::control::ProcessingMode;

/// Errors raised while talking to a sensor over the register bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// Register read or write failed; the device is re-initialized before the next cycle
    #[error("bus I/O error at register 0x{register:02X}: {message}")]
    BusIo { register: u8, message: String },

    /// Compensation coefficients could not be decoded
    #[error("calibration unavailable")]
    CalibrationUnavailable,

    /// The new-data bit never appeared within the polling budget
    #[error("measurement timed out after {attempts} status polls")]
    Timeout { attempts: u32 },

    /// Device reported its "no valid measurement" raw value
    #[error("sensor returned the no-measurement sentinel")]
    SentinelReading,

    /// Wrong chip ID
    #[error("unexpected chip ID: expected 0x{expected:02X}, got 0x{found:02X}")]
    DeviceNotFound { expected: u8, found: u8 },

    /// Driver has not completed initialization
    #[error("sensor not initialized")]
    NotInitialized,

    /// Device refused its configuration image
    #[error("init image rejected (internal status 0x{status:02X})")]
    InitRejected { status: u8 },
}

impl AcquisitionError {
    pub fn bus(register: u8, err: impl std::fmt::Display) -> Self {
        AcquisitionError::BusIo {
            register,
            message: err.to_string(),
        }
    }

    /// True when the failure leaves the device session in an unknown state
    pub fn requires_reinit(&self) -> bool {
        matches!(
            self,
            AcquisitionError::BusIo { .. }
                | AcquisitionError::CalibrationUnavailable
                | AcquisitionError::DeviceNotFound { .. }
                | AcquisitionError::NotInitialized
                | AcquisitionError::InitRejected { .. }
        )
    }
}

/// Errors produced while turning readings into a telemetry record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// Every sample of an RMS window failed
    #[error("no samples acquired in a window of {attempted}")]
    EmptyWindow { attempted: usize },

    /// Mode is selectable but has no output contract yet
    #[error("processing mode {0:?} is not implemented")]
    ModeNotImplemented(ProcessingMode),
}

/// Network session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("control connection lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    #[error("control channel not connected")]
    NotConnected,
}

/// Result type for acquisition operations
pub type Result<T> = std::result::Result<T, AcquisitionError>;
