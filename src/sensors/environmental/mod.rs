//! BME688 environmental sensor - calibration, compensation and forced-mode acquisition

mod acquisition;
mod calibration;
pub mod compensation;

pub use acquisition::{AcquisitionProtocol, CycleState, ForcedModeSettings, RawFrame, ADC_TEMPERATURE_SENTINEL};
pub use calibration::CalibrationCoefficients;

use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::control::SensorKind;
use crate::core::Delay;
use crate::error::{AcquisitionError, Result};
use super::bus::RegisterBus;
use super::{Reading, SensorSource, SensorStatus};
use self::compensation::{
    compensate_humidity, compensate_pressure, compensate_temperature, estimate_gas_resistance,
    gas_wait_code, heater_resistance_code,
};

/// BME688 register map
pub(crate) mod regs {
    pub const RES_HEAT_VAL: u8 = 0x00;
    pub const RES_HEAT_RANGE: u8 = 0x02;
    /// Bit 7: new data
    pub const STATUS: u8 = 0x1D;
    pub const DATA_START: u8 = 0x1F;
    /// press(3) temp(3) hum(2) reserved(5) gas_msb(1) gas_lsb(1)
    pub const DATA_LEN: usize = 15;
    pub const RES_HEAT_0: u8 = 0x5A;
    pub const GAS_WAIT_0: u8 = 0x64;
    pub const CTRL_GAS_1: u8 = 0x71;
    pub const CTRL_HUM: u8 = 0x72;
    pub const CTRL_MEAS: u8 = 0x74;
    pub const CALIB_T2: u8 = 0x8A;
    pub const CALIB_T3: u8 = 0x8C;
    pub const CALIB_PRESS: u8 = 0x8E;
    pub const CALIB_PRESS_LEN: usize = 19;
    pub const CHIP_ID: u8 = 0xD0;
    pub const SOFT_RESET: u8 = 0xE0;
    pub const CALIB_HUM: u8 = 0xE1;
    pub const CALIB_HUM_LEN: usize = 10;
    pub const CALIB_T1: u8 = 0xE9;
    pub const CALIB_G2: u8 = 0xEB;
    pub const CALIB_G1: u8 = 0xED;
    pub const CALIB_G3: u8 = 0xEE;

    pub const CHIP_ID_VALUE: u8 = 0x61;
    pub const SOFT_RESET_CMD: u8 = 0xB6;
}

/// Heater code written when no target temperature is configured (~300 °C)
pub const DEFAULT_RES_HEAT: u8 = 0xAC;

/// Oversampling setting for one measurement channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Oversampling {
    Skip,
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    pub fn code(&self) -> u8 {
        match self {
            Oversampling::Skip => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 3,
            Oversampling::X8 => 4,
            Oversampling::X16 => 5,
        }
    }
}

/// Environmental sensor acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentalConfig {
    /// Base wait after triggering, covers gas heating
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    /// Wait after soft reset
    pub reset_settle_ms: u64,

    pub humidity_oversampling: Oversampling,
    pub temperature_oversampling: Oversampling,
    pub pressure_oversampling: Oversampling,

    pub heater_duration_ms: u16,
    /// Heater plate target. `None` writes [`DEFAULT_RES_HEAT`].
    pub heater_target_c: Option<f32>,
    pub ambient_c: f32,
}

impl Default for EnvironmentalConfig {
    fn default() -> Self {
        Self {
            settle_ms: 120,
            poll_interval_ms: 10,
            max_poll_attempts: 50,
            reset_settle_ms: 100,
            humidity_oversampling: Oversampling::X1,
            temperature_oversampling: Oversampling::X2,
            pressure_oversampling: Oversampling::X16,
            heater_duration_ms: 100,
            heater_target_c: None,
            ambient_c: 25.0,
        }
    }
}

impl EnvironmentalConfig {
    /// Register values for the forced cycle; heater code depends on calibration
    pub fn forced_mode_settings(&self, calib: &CalibrationCoefficients) -> ForcedModeSettings {
        let res_heat = match self.heater_target_c {
            Some(target) => heater_resistance_code(target, self.ambient_c, calib),
            None => DEFAULT_RES_HEAT,
        };
        ForcedModeSettings {
            ctrl_hum: self.humidity_oversampling.code(),
            ctrl_meas: (self.temperature_oversampling.code() << 5)
                | (self.pressure_oversampling.code() << 2),
            gas_wait: gas_wait_code(self.heater_duration_ms),
            res_heat,
            settle_ms: self.settle_ms,
            poll_interval_ms: self.poll_interval_ms,
            max_poll_attempts: self.max_poll_attempts,
        }
    }
}

/// Compensate one raw frame. `t_fine` flows from temperature into the other two.
pub fn compensate(frame: &RawFrame, calib: &CalibrationCoefficients) -> Reading {
    let (temperature_c, t_fine) = compensate_temperature(frame.adc_temperature, calib);
    Reading::Environmental {
        temperature_c,
        pressure_pa: compensate_pressure(frame.adc_pressure, calib, t_fine),
        humidity_pct: compensate_humidity(frame.adc_humidity, calib, t_fine),
        gas_resistance_ohm: estimate_gas_resistance(frame.adc_gas),
    }
}

/// BME688 driver
pub struct Bme688<B> {
    bus: B,
    delay: Arc<dyn Delay>,
    config: EnvironmentalConfig,
    calibration: Option<CalibrationCoefficients>,
    protocol: AcquisitionProtocol,
    status: SensorStatus,
}

impl<B: RegisterBus> Bme688<B> {
    pub fn new(bus: B, delay: Arc<dyn Delay>, config: EnvironmentalConfig) -> Self {
        Self {
            bus,
            delay,
            config,
            calibration: None,
            protocol: AcquisitionProtocol::new(ForcedModeSettings::default()),
            status: SensorStatus::Uninitialized,
        }
    }

    pub fn calibration(&self) -> Option<&CalibrationCoefficients> {
        self.calibration.as_ref()
    }

    pub fn cycle_state(&self) -> CycleState {
        self.protocol.state()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    async fn bring_up(&mut self) -> Result<()> {
        let id = self.bus.read_u8(regs::CHIP_ID)?;
        if id != regs::CHIP_ID_VALUE {
            return Err(AcquisitionError::DeviceNotFound {
                expected: regs::CHIP_ID_VALUE,
                found: id,
            });
        }

        self.bus.write_register(regs::SOFT_RESET, regs::SOFT_RESET_CMD)?;
        self.delay.delay_ms(self.config.reset_settle_ms).await;

        // Coefficients live in NVM; a session reset does not change them
        let calib = match self.calibration {
            Some(calib) => calib,
            None => {
                let calib = CalibrationCoefficients::decode(&mut self.bus)?;
                self.calibration = Some(calib);
                calib
            }
        };

        let settings = self.config.forced_mode_settings(&calib);
        debug!("Forced-mode settings: {:?}", settings);
        self.protocol.finish_reinit(settings);
        Ok(())
    }
}

#[async_trait]
impl<B: RegisterBus> SensorSource for Bme688<B> {
    fn kind(&self) -> SensorKind {
        SensorKind::Environmental
    }

    fn status(&self) -> SensorStatus {
        self.status
    }

    async fn initialize(&mut self) -> Result<()> {
        self.protocol.begin_reinit();
        match self.bring_up().await {
            Ok(()) => {
                self.status = SensorStatus::Active;
                info!("BME688 initialized");
                Ok(())
            }
            Err(e) => {
                self.status = SensorStatus::Faulted;
                error!("BME688 initialization failed: {}", e);
                Err(e)
            }
        }
    }

    async fn read(&mut self) -> Result<Reading> {
        if self.status != SensorStatus::Active {
            self.initialize().await?;
        }
        let calib = self.calibration.ok_or(AcquisitionError::CalibrationUnavailable)?;

        match self.protocol.run_cycle(&mut self.bus, self.delay.as_ref()).await {
            Ok(frame) => Ok(compensate(&frame, &calib)),
            Err(e) => {
                if self.protocol.is_faulted() || e.requires_reinit() {
                    warn!("BME688 session faulted ({}), re-initializing before next cycle", e);
                    self.status = SensorStatus::Faulted;
                }
                Err(e)
            }
        }
    }
}
