// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Windowed RMS of acceleration

use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;

/// Result of one closed window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmsSummary {
    /// `sqrt(rms_x² + rms_y² + rms_z²)`
    pub rms: f32,
    /// Samples that contributed
    pub samples: usize,
}

/// Per-axis sum of squares over the successful samples of a window
#[derive(Debug, Clone, Default)]
pub struct RmsAccumulator {
    sum_sq: [f64; 3],
    samples: usize,
    attempted: usize,
}

impl RmsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ax: f32, ay: f32, az: f32) {
        for (sum, v) in self.sum_sq.iter_mut().zip([ax, ay, az]) {
            *sum += (v as f64) * (v as f64);
        }
        self.samples += 1;
        self.attempted += 1;
    }

    /// Count a sample that could not be acquired
    pub fn skip(&mut self) {
        self.attempted += 1;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Close the window. A window with no successful sample is an error, never an N=0 record.
    pub fn finish(&self) -> Result<RmsSummary, ProcessingError> {
        if self.samples == 0 {
            return Err(ProcessingError::EmptyWindow {
                attempted: self.attempted,
            });
        }
        let n = self.samples as f64;
        let magnitude = self.sum_sq.iter().map(|s| s / n).sum::<f64>().sqrt();
        Ok(RmsSummary {
            rms: magnitude as f32,
            samples: self.samples,
        })
    }
}
