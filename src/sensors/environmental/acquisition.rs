// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Forced-mode measurement cycle
//!
//! ```text
//! Idle -> Configuring -> Triggered -> Polling{n} -> Ready
//!                            |             |
//!                            v             v
//!                         Faulted       TimedOut
//!                            |
//!                            v
//!                      Reinitializing -> Idle
//! ```

use tracing::{debug, trace, warn};

use crate::core::Delay;
use crate::error::{AcquisitionError, Result};
use crate::sensors::bus::RegisterBus;
use super::regs;

/// Raw temperature code the device reports when nothing was measured
pub const ADC_TEMPERATURE_SENTINEL: u32 = 0x80000;

/// Bit 7 of the status register
const NEW_DATA: u8 = 0x80;
const MODE_MASK: u8 = 0x03;
const MODE_FORCED: u8 = 0x01;
const RUN_GAS: u8 = 0x20;

/// ADC codes from one forced-mode measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    pub adc_temperature: u32,
    pub adc_pressure: u32,
    pub adc_humidity: u16,
    pub adc_gas: u16,
    pub gas_range: u8,
}

impl RawFrame {
    /// Unpack the 15-byte block read from 0x1F
    pub fn from_registers(raw: &[u8; regs::DATA_LEN]) -> Self {
        let be20 = |b: &[u8]| ((b[0] as u32) << 12) | ((b[1] as u32) << 4) | ((b[2] as u32) >> 4);
        Self {
            adc_pressure: be20(&raw[0..3]),
            adc_temperature: be20(&raw[3..6]),
            adc_humidity: u16::from_be_bytes([raw[6], raw[7]]),
            adc_gas: ((raw[13] as u16) << 2) | ((raw[14] as u16) >> 6),
            gas_range: raw[14] & 0x0F,
        }
    }
}

/// Where the current cycle is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Configuring,
    Triggered,
    Polling { attempts_remaining: u32 },
    Ready,
    TimedOut,
    Faulted,
    Reinitializing,
}

/// Register values and timing for one forced measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedModeSettings {
    pub ctrl_hum: u8,
    /// ctrl_meas with the mode bits left at sleep
    pub ctrl_meas: u8,
    pub gas_wait: u8,
    pub res_heat: u8,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

impl Default for ForcedModeSettings {
    fn default() -> Self {
        Self {
            ctrl_hum: 0x01,
            ctrl_meas: 0x54,
            gas_wait: 0x59,
            res_heat: 0xAC,
            settle_ms: 120,
            poll_interval_ms: 10,
            max_poll_attempts: 50,
        }
    }
}

/// Drives the configure/trigger/poll/read sequence
#[derive(Debug)]
pub struct AcquisitionProtocol {
    settings: ForcedModeSettings,
    state: CycleState,
}

impl AcquisitionProtocol {
    pub fn new(settings: ForcedModeSettings) -> Self {
        Self {
            settings,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn settings(&self) -> &ForcedModeSettings {
        &self.settings
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.state, CycleState::Faulted | CycleState::Reinitializing)
    }

    /// Mark the start of a device re-initialization
    pub fn begin_reinit(&mut self) {
        self.state = CycleState::Reinitializing;
    }

    /// Device answered again; accept new register settings and go back to idle
    pub fn finish_reinit(&mut self, settings: ForcedModeSettings) {
        self.settings = settings;
        self.state = CycleState::Idle;
    }

    /// Run one full measurement. Bus failures leave the protocol `Faulted`.
    pub async fn run_cycle<B, D>(&mut self, bus: &mut B, delay: &D) -> Result<RawFrame>
    where
        B: RegisterBus + ?Sized,
        D: Delay + ?Sized,
    {
        if self.is_faulted() {
            return Err(AcquisitionError::NotInitialized);
        }
        self.state = CycleState::Idle;

        let result = self.cycle(bus, delay).await;
        if let Err(AcquisitionError::BusIo { register, .. }) = &result {
            warn!("Bus failure at 0x{:02X} during {:?}", register, self.state);
            self.state = CycleState::Faulted;
        }
        result
    }

    async fn cycle<B, D>(&mut self, bus: &mut B, delay: &D) -> Result<RawFrame>
    where
        B: RegisterBus + ?Sized,
        D: Delay + ?Sized,
    {
        self.state = CycleState::Configuring;
        let s = self.settings;
        bus.write_register(regs::CTRL_HUM, s.ctrl_hum)?;
        bus.write_register(regs::CTRL_MEAS, s.ctrl_meas & !MODE_MASK)?;
        bus.write_register(regs::GAS_WAIT_0, s.gas_wait)?;
        bus.write_register(regs::RES_HEAT_0, s.res_heat)?;
        bus.write_register(regs::CTRL_GAS_1, RUN_GAS)?;

        self.state = CycleState::Triggered;
        bus.write_register(regs::CTRL_MEAS, (s.ctrl_meas & !MODE_MASK) | MODE_FORCED)?;

        self.poll(bus, delay).await?;

        let mut raw = [0u8; regs::DATA_LEN];
        bus.read_registers(regs::DATA_START, &mut raw)?;
        self.state = CycleState::Ready;

        let frame = RawFrame::from_registers(&raw);
        trace!("Raw frame: {:?}", frame);
        if frame.adc_temperature == ADC_TEMPERATURE_SENTINEL {
            return Err(AcquisitionError::SentinelReading);
        }
        Ok(frame)
    }

    async fn poll<B, D>(&mut self, bus: &mut B, delay: &D) -> Result<()>
    where
        B: RegisterBus + ?Sized,
        D: Delay + ?Sized,
    {
        let max = self.settings.max_poll_attempts.max(1);
        self.state = CycleState::Polling { attempts_remaining: max };
        delay.delay_ms(self.settings.settle_ms).await;

        while let CycleState::Polling { attempts_remaining } = self.state {
            let status = bus.read_u8(regs::STATUS)?;
            if status & NEW_DATA != 0 {
                debug!("New data after {} polls", max - attempts_remaining + 1);
                return Ok(());
            }

            if attempts_remaining <= 1 {
                self.state = CycleState::TimedOut;
                return Err(AcquisitionError::Timeout { attempts: max });
            }
            self.state = CycleState::Polling {
                attempts_remaining: attempts_remaining - 1,
            };
            delay.delay_ms(self.settings.poll_interval_ms).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::clock::testing::RecordingDelay;
    use crate::sensors::bus::mock::MockBus;

    fn frame_bus() -> MockBus {
        let mut bus = MockBus::new();
        // press 0x5A3B2_, temp 0x7A1C3_, hum 0x5D12, gas msb 0x7D, lsb 0b10_xx_0101
        bus.load(
            0x1F,
            &[0x5A, 0x3B, 0x20, 0x7A, 0x1C, 0x30, 0x5D, 0x12, 0, 0, 0, 0, 0, 0x7D, 0x85],
        );
        bus
    }

    #[test]
    fn test_raw_frame_unpacking() {
        let raw = [0x5A, 0x3B, 0x20, 0x7A, 0x1C, 0x30, 0x5D, 0x12, 0, 0, 0, 0, 0, 0x7D, 0x85];
        let frame = RawFrame::from_registers(&raw);
        assert_eq!(frame.adc_pressure, 0x5A3B2);
        assert_eq!(frame.adc_temperature, 0x7A1C3);
        assert_eq!(frame.adc_humidity, 0x5D12);
        assert_eq!(frame.adc_gas, (0x7D << 2) | 0x2);
        assert_eq!(frame.gas_range, 0x5);
    }

    #[tokio::test]
    async fn test_cycle_writes_config_then_trigger() {
        let mut bus = frame_bus();
        bus.polls_until_ready = Some(2);
        let delay = RecordingDelay::default();
        let mut proto = AcquisitionProtocol::new(ForcedModeSettings::default());

        let frame = proto.run_cycle(&mut bus, &delay).await.unwrap();

        assert_eq!(frame.adc_temperature, 0x7A1C3);
        assert_eq!(proto.state(), CycleState::Ready);
        assert_eq!(
            bus.writes,
            vec![(0x72, 0x01), (0x74, 0x54), (0x64, 0x59), (0x5A, 0xAC), (0x71, 0x20), (0x74, 0x55)]
        );
        assert_eq!(bus.polls, 3);
        assert_eq!(delay.total(), Duration::from_millis(120 + 2 * 10));
    }

    #[tokio::test]
    async fn test_poll_budget_exhaustion_times_out() {
        let mut bus = frame_bus();
        bus.polls_until_ready = None;
        let delay = RecordingDelay::default();
        let mut proto = AcquisitionProtocol::new(ForcedModeSettings::default());

        let err = proto.run_cycle(&mut bus, &delay).await.unwrap_err();

        assert_eq!(err, AcquisitionError::Timeout { attempts: 50 });
        assert_eq!(proto.state(), CycleState::TimedOut);
        assert_eq!(bus.polls, 50);
        assert_eq!(delay.total(), Duration::from_millis(120 + 49 * 10));

        // A timeout is not a fault: the next cycle runs normally
        bus.polls_until_ready = Some(0);
        bus.polls = 0;
        assert!(proto.run_cycle(&mut bus, &delay).await.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_failure_faults_until_reinit() {
        let mut bus = frame_bus();
        bus.failing_writes.insert((0x74, 0x55));
        let delay = RecordingDelay::default();
        let mut proto = AcquisitionProtocol::new(ForcedModeSettings::default());

        let err = proto.run_cycle(&mut bus, &delay).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::BusIo { register: 0x74, .. }));
        assert_eq!(proto.state(), CycleState::Faulted);

        bus.failing_writes.clear();
        assert_eq!(
            proto.run_cycle(&mut bus, &delay).await.unwrap_err(),
            AcquisitionError::NotInitialized
        );

        proto.begin_reinit();
        assert_eq!(proto.state(), CycleState::Reinitializing);
        proto.finish_reinit(ForcedModeSettings::default());
        assert_eq!(proto.state(), CycleState::Idle);
        assert!(proto.run_cycle(&mut bus, &delay).await.is_ok());
    }

    #[tokio::test]
    async fn test_sentinel_is_distinct_failure() {
        let mut bus = MockBus::new();
        bus.load(0x22, &[0x80, 0x00, 0x00]);
        let delay = RecordingDelay::default();
        let mut proto = AcquisitionProtocol::new(ForcedModeSettings::default());

        let err = proto.run_cycle(&mut bus, &delay).await.unwrap_err();
        assert_eq!(err, AcquisitionError::SentinelReading);
        assert!(!proto.is_faulted());
    }
}
