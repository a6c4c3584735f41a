// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! BMI270 6-axis IMU (accelerometer + gyroscope)

use std::path::Path;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::{error, info, trace, warn};

use crate::control::SensorKind;
use crate::core::Delay;
use crate::error::{AcquisitionError, Result};
use super::bus::RegisterBus;
use super::{Reading, SensorSource, SensorStatus};

pub(crate) mod regs {
    pub const CHIP_ID: u8 = 0x00;
    /// acc_x..acc_z then gyr_x..gyr_z, little-endian i16
    pub const DATA_START: u8 = 0x0C;
    pub const DATA_LEN: usize = 12;
    pub const INTERNAL_STATUS: u8 = 0x21;
    pub const ACC_CONF: u8 = 0x40;
    pub const ACC_RANGE: u8 = 0x41;
    pub const GYR_CONF: u8 = 0x42;
    pub const GYR_RANGE: u8 = 0x43;
    pub const INIT_CTRL: u8 = 0x59;
    pub const INIT_ADDR_0: u8 = 0x5B;
    pub const INIT_ADDR_1: u8 = 0x5C;
    pub const INIT_DATA: u8 = 0x5E;
    pub const PWR_CONF: u8 = 0x7C;
    pub const PWR_CTRL: u8 = 0x7D;
    pub const CMD: u8 = 0x7E;

    pub const CHIP_ID_VALUE: u8 = 0x24;
    pub const SOFT_RESET_CMD: u8 = 0xB6;
    /// acc + gyr + temperature enabled
    pub const PWR_CTRL_ENABLE: u8 = 0x0E;
    /// ODR 100 Hz, normal filter, performance mode
    pub const ACC_CONF_VALUE: u8 = 0xA8;
    pub const GYR_CONF_VALUE: u8 = 0xA9;
    /// ±8 g
    pub const ACC_RANGE_VALUE: u8 = 0x02;
    /// ±2000 °/s
    pub const GYR_RANGE_VALUE: u8 = 0x00;
}

const STANDARD_GRAVITY: f32 = 9.80665;
/// m/s² per LSB at ±8 g
pub const ACCEL_SCALE: f32 = 8.0 * STANDARD_GRAVITY / 32768.0;
/// rad/s per LSB at ±2000 °/s
pub const GYRO_SCALE: f32 = 2000.0 / 32768.0 * (std::f32::consts::PI / 180.0);

const INIT_CHUNK: usize = 32;

/// Convert one 12-byte data frame into physical units
pub fn convert_frame(raw: &[u8; regs::DATA_LEN]) -> Reading {
    let axis = |i: usize| i16::from_le_bytes([raw[i], raw[i + 1]]) as f32;
    Reading::Motion {
        ax: axis(0) * ACCEL_SCALE,
        ay: axis(2) * ACCEL_SCALE,
        az: axis(4) * ACCEL_SCALE,
        gx: axis(6) * GYRO_SCALE,
        gy: axis(8) * GYRO_SCALE,
        gz: axis(10) * GYRO_SCALE,
    }
}

/// BMI270 driver. The register protocol is kept minimal: probe, optional
/// init image, enable both sensors, then one burst read per sample.
pub struct Bmi270<B> {
    bus: B,
    delay: Arc<dyn Delay>,
    init_blob: Option<Vec<u8>>,
    status: SensorStatus,
}

impl<B: RegisterBus> Bmi270<B> {
    pub fn new(bus: B, delay: Arc<dyn Delay>) -> Self {
        Self {
            bus,
            delay,
            init_blob: None,
            status: SensorStatus::Uninitialized,
        }
    }

    pub fn with_init_blob(mut self, blob: Vec<u8>) -> Self {
        self.init_blob = Some(blob);
        self
    }

    /// Driver that uploads the feature-engine image at `init_blob` during init, when given
    pub fn open(bus: B, delay: Arc<dyn Delay>, init_blob: Option<&Path>) -> std::io::Result<Self> {
        let sensor = Self::new(bus, delay);
        match init_blob {
            Some(path) => {
                let blob = std::fs::read(path)?;
                info!("Loaded BMI270 init image {:?} ({} bytes)", path, blob.len());
                Ok(sensor.with_init_blob(blob))
            }
            None => Ok(sensor),
        }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    async fn upload_init_blob(&mut self, blob: &[u8]) -> Result<()> {
        self.bus.write_register(regs::PWR_CONF, 0x00)?;
        self.delay.delay_ms(1).await;
        self.bus.write_register(regs::INIT_CTRL, 0x00)?;

        for (n, chunk) in blob.chunks(INIT_CHUNK).enumerate() {
            // Address is in 16-bit words
            let word = (n * INIT_CHUNK / 2) as u16;
            self.bus.write_register(regs::INIT_ADDR_0, (word & 0x0F) as u8)?;
            self.bus.write_register(regs::INIT_ADDR_1, (word >> 4) as u8)?;
            self.bus.write_registers(regs::INIT_DATA, chunk)?;
        }

        self.bus.write_register(regs::INIT_CTRL, 0x01)?;
        self.delay.delay_ms(20).await;

        let status = self.bus.read_u8(regs::INTERNAL_STATUS)?;
        if status & 0x0F != 0x01 {
            warn!("BMI270 init image not accepted (internal status 0x{:02X})", status);
            return Err(AcquisitionError::InitRejected { status });
        }
        Ok(())
    }

    async fn bring_up(&mut self) -> Result<()> {
        let id = self.bus.read_u8(regs::CHIP_ID)?;
        if id != regs::CHIP_ID_VALUE {
            return Err(AcquisitionError::DeviceNotFound {
                expected: regs::CHIP_ID_VALUE,
                found: id,
            });
        }

        self.bus.write_register(regs::CMD, regs::SOFT_RESET_CMD)?;
        self.delay.delay_ms(2).await;

        if let Some(blob) = self.init_blob.take() {
            let result = self.upload_init_blob(&blob).await;
            self.init_blob = Some(blob);
            result?;
        }

        self.bus.write_register(regs::PWR_CTRL, regs::PWR_CTRL_ENABLE)?;
        self.bus.write_register(regs::ACC_CONF, regs::ACC_CONF_VALUE)?;
        self.bus.write_register(regs::ACC_RANGE, regs::ACC_RANGE_VALUE)?;
        self.bus.write_register(regs::GYR_CONF, regs::GYR_CONF_VALUE)?;
        self.bus.write_register(regs::GYR_RANGE, regs::GYR_RANGE_VALUE)?;
        self.bus.write_register(regs::PWR_CONF, 0x02)?;
        Ok(())
    }
}

#[async_trait]
impl<B: RegisterBus> SensorSource for Bmi270<B> {
    fn kind(&self) -> SensorKind {
        SensorKind::Motion
    }

    fn status(&self) -> SensorStatus {
        self.status
    }

    async fn initialize(&mut self) -> Result<()> {
        match self.bring_up().await {
            Ok(()) => {
                self.status = SensorStatus::Active;
                info!("BMI270 initialized");
                Ok(())
            }
            Err(e) => {
                self.status = SensorStatus::Faulted;
                error!("BMI270 initialization failed: {}", e);
                Err(e)
            }
        }
    }

    async fn read(&mut self) -> Result<Reading> {
        if self.status != SensorStatus::Active {
            self.initialize().await?;
        }

        let mut raw = [0u8; regs::DATA_LEN];
        if let Err(e) = self.bus.read_registers(regs::DATA_START, &mut raw) {
            self.status = SensorStatus::Faulted;
            return Err(e);
        }
        let reading = convert_frame(&raw);
        trace!("BMI270 sample: {:?}", reading);
        Ok(reading)
    }
}
