// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Register-level sensor simulators for demo/testing
//!
//! These stand in for the I2C bus, so the real drivers run unchanged on top
//! of them: calibration decode, forced-mode polling and burst reads all go
//! through the same register traffic a physical part would see.

use rand::prelude::*;
use rand_distr::Normal;
use tracing::trace;

use crate::error::{AcquisitionError, Result};
use super::bus::RegisterBus;
use super::environmental::regs as env;
use super::motion::regs as imu;

/// Calibration image of a typical BME688 (t1 26085, p1 36660, h1 797, ...)
const BME688_CALIBRATION: &[(u8, &[u8])] = &[
    (env::CALIB_T2, &[0xF0, 0x66, 0x03]),
    (
        env::CALIB_PRESS,
        &[
            0x34, 0x8F, 0x7A, 0xD7, 0x58, 0x00, 0xA0, 0x1C, 0x95, 0xFF, 0x42, 0x1E, 0x00, 0x00,
            0x16, 0xF0, 0x40, 0xF6, 0x1E,
        ],
    ),
    (env::CALIB_HUM, &[0x3F, 0x2D, 0x31, 0x00, 0x2D, 0x14, 0x78, 0x9C, 0xE5, 0x65]),
    (env::CALIB_G2, &[0xF0, 0xD8, 0xE2, 0x12]),
    (env::RES_HEAT_RANGE, &[0x10]),
    (env::RES_HEAT_VAL, &[0x28]),
];

/// Draw `true` with the given probability
fn roll(rng: &mut StdRng, probability: f64) -> bool {
    probability > 0.0 && rng.gen::<f64>() < probability
}

/// Simulated BME688 register file
pub struct SimulatedBme688Bus {
    regs: [u8; 256],
    rng: StdRng,
    drift: f64,
    fault_probability: f64,
    measuring: bool,
}

impl SimulatedBme688Bus {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut regs = [0u8; 256];
        regs[env::CHIP_ID as usize] = env::CHIP_ID_VALUE;
        for (start, bytes) in BME688_CALIBRATION {
            let start = *start as usize;
            regs[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Self {
            regs,
            rng,
            drift: 0.0,
            fault_probability: 0.0,
            measuring: false,
        }
    }

    /// Chance that any single bus transfer fails
    pub fn with_fault_probability(mut self, probability: f64) -> Self {
        self.fault_probability = probability;
        self
    }

    fn noise(&mut self, sigma: f64) -> f64 {
        match Normal::new(0.0, sigma) {
            Ok(dist) => self.rng.sample(dist),
            Err(_) => 0.0,
        }
    }

    /// Latch a fresh measurement into the data registers
    fn measure(&mut self) {
        self.drift = (self.drift + self.rng.gen_range(-20.0..20.0)).clamp(-3000.0, 3000.0);

        let adc_t = (500_000.0 + self.drift + self.noise(150.0)) as u32;
        let adc_p = (300_000.0 - self.drift * 0.2 + self.noise(40.0)) as u32;
        let adc_h = (20_000.0 + self.noise(60.0)) as u16;
        let adc_g = (500.0 + self.noise(8.0)).clamp(1.0, 1023.0) as u16;

        let base = env::DATA_START as usize;
        let be20 = |v: u32| [(v >> 12) as u8, (v >> 4) as u8, ((v & 0x0F) << 4) as u8];
        self.regs[base..base + 3].copy_from_slice(&be20(adc_p));
        self.regs[base + 3..base + 6].copy_from_slice(&be20(adc_t));
        self.regs[base + 6..base + 8].copy_from_slice(&adc_h.to_be_bytes());
        // gas_r_msb, gas_r_lsb: 10-bit code, valid + heat-stable bits, range 4
        self.regs[base + 13] = (adc_g >> 2) as u8;
        self.regs[base + 14] = (((adc_g & 0x03) as u8) << 6) | 0x30 | 0x04;

        self.regs[env::STATUS as usize] = 0x80;
        trace!("Simulated BME688 frame: t={} p={} h={} g={}", adc_t, adc_p, adc_h, adc_g);
    }
}

impl Default for SimulatedBme688Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimulatedBme688Bus {
    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<()> {
        if roll(&mut self.rng, self.fault_probability) {
            return Err(AcquisitionError::bus(register, "simulated NACK"));
        }
        let start = register as usize;
        let end = (start + buf.len()).min(self.regs.len());
        buf[..end - start].copy_from_slice(&self.regs[start..end]);

        // New-data flag clears once the data block has been read
        if register == env::DATA_START && self.measuring {
            self.measuring = false;
            self.regs[env::STATUS as usize] = 0x00;
        }
        Ok(())
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        if roll(&mut self.rng, self.fault_probability) {
            return Err(AcquisitionError::bus(register, "simulated NACK"));
        }
        match register {
            env::SOFT_RESET if value == env::SOFT_RESET_CMD => {
                self.regs[env::CTRL_MEAS as usize] = 0;
                self.regs[env::STATUS as usize] = 0;
                self.measuring = false;
            }
            env::CTRL_MEAS if value & 0x03 == 0x01 => {
                self.regs[register as usize] = value;
                self.measuring = true;
                self.measure();
            }
            _ => self.regs[register as usize] = value,
        }
        Ok(())
    }
}

/// Simulated BMI270 register file: resting flat, gravity on +Z
pub struct SimulatedBmi270Bus {
    regs: [u8; 256],
    rng: StdRng,
    fault_probability: f64,
    vibration_probability: f64,
}

impl SimulatedBmi270Bus {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut regs = [0u8; 256];
        regs[imu::CHIP_ID as usize] = imu::CHIP_ID_VALUE;
        Self {
            regs,
            rng,
            fault_probability: 0.0,
            vibration_probability: 0.02,
        }
    }

    pub fn with_fault_probability(mut self, probability: f64) -> Self {
        self.fault_probability = probability;
        self
    }

    fn axis(&mut self, mean: f64, sigma: f64) -> i16 {
        let noise = Normal::new(0.0, sigma).map(|d| self.rng.sample(d)).unwrap_or(0.0);
        (mean + noise).clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    fn sample(&mut self) {
        // 4096 LSB/g at ±8 g
        let mut frame = [
            self.axis(0.0, 20.0),
            self.axis(0.0, 20.0),
            self.axis(4096.0, 20.0),
            self.axis(0.0, 8.0),
            self.axis(0.0, 8.0),
            self.axis(0.0, 8.0),
        ];
        if roll(&mut self.rng, self.vibration_probability) {
            let axis = self.rng.gen_range(0..3);
            frame[axis] = frame[axis].saturating_add(self.rng.gen_range(-2000..2000));
        }

        let base = imu::DATA_START as usize;
        for (i, value) in frame.iter().enumerate() {
            self.regs[base + i * 2..base + i * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
    }
}

impl Default for SimulatedBmi270Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimulatedBmi270Bus {
    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<()> {
        if roll(&mut self.rng, self.fault_probability) {
            return Err(AcquisitionError::bus(register, "simulated NACK"));
        }
        if register == imu::DATA_START {
            self.sample();
        }
        let start = register as usize;
        let end = (start + buf.len()).min(self.regs.len());
        buf[..end - start].copy_from_slice(&self.regs[start..end]);
        Ok(())
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        if roll(&mut self.rng, self.fault_probability) {
            return Err(AcquisitionError::bus(register, "simulated NACK"));
        }
        self.regs[register as usize] = value;
        if register == imu::INIT_CTRL && value == 0x01 {
            self.regs[imu::INTERNAL_STATUS as usize] = 0x01;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::clock::testing::RecordingDelay;
    use crate::sensors::environmental::{Bme688, EnvironmentalConfig};
    use crate::sensors::motion::Bmi270;
    use crate::sensors::{Reading, SensorSource};

    #[tokio::test]
    async fn test_bme688_driver_reads_simulated_bus() {
        let delay = Arc::new(RecordingDelay::default());
        let mut dev = Bme688::new(SimulatedBme688Bus::seeded(7), delay, EnvironmentalConfig::default());

        for _ in 0..5 {
            match dev.read().await.unwrap() {
                Reading::Environmental { temperature_c, pressure_pa, humidity_pct, .. } => {
                    assert!(temperature_c > 15.0 && temperature_c < 35.0);
                    assert!(pressure_pa > 30_000.0 && pressure_pa < 150_000.0);
                    assert!((0.0..=100.0).contains(&humidity_pct));
                }
                other => panic!("unexpected reading {:?}", other),
            }
        }
        assert_eq!(dev.calibration().map(|c| c.t1), Some(26085));
    }

    #[tokio::test]
    async fn test_bmi270_driver_reads_gravity() {
        let delay = Arc::new(RecordingDelay::default());
        let mut dev = Bmi270::new(SimulatedBmi270Bus::seeded(7), delay);

        let mut az_sum = 0.0;
        for _ in 0..20 {
            if let Reading::Motion { az, .. } = dev.read().await.unwrap() {
                az_sum += az;
            }
        }
        let az_mean = az_sum / 20.0;
        assert!((az_mean - 9.81).abs() < 1.5, "az mean = {}", az_mean);
    }

    #[test]
    fn test_fault_probability_one_always_fails() {
        let mut bus = SimulatedBme688Bus::seeded(1).with_fault_probability(1.0);
        assert!(bus.read_u8(env::CHIP_ID).is_err());
    }
}
