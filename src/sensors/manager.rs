// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sensor manager - owns both devices and tracks their health

use std::sync::Arc;
use tracing::{debug, error, info};

use super::environmental::Bme688;
use super::motion::Bmi270;
use super::simulator::{SimulatedBme688Bus, SimulatedBmi270Bus};
use super::{Reading, SensorHealth, SensorSource, SensorStatus};
use crate::config::Config;
use crate::control::SensorKind;
use crate::core::Delay;
use crate::error::Result;

/// The two sensors on the bus, addressed by kind
pub struct SensorManager {
    motion: Box<dyn SensorSource>,
    environmental: Box<dyn SensorSource>,
    motion_health: SensorHealth,
    environmental_health: SensorHealth,
}

impl SensorManager {
    pub fn new(motion: Box<dyn SensorSource>, environmental: Box<dyn SensorSource>) -> Self {
        Self {
            motion,
            environmental,
            motion_health: SensorHealth::default(),
            environmental_health: SensorHealth::default(),
        }
    }

    /// Both drivers on simulated register buses
    pub fn simulated(config: &Config, delay: Arc<dyn Delay>) -> anyhow::Result<Self> {
        info!("Using simulated sensors");
        let motion = Bmi270::open(
            SimulatedBmi270Bus::new(),
            delay.clone(),
            config.bus.motion_init_blob.as_deref(),
        )?;
        let environmental = Bme688::new(SimulatedBme688Bus::new(), delay, config.acquisition.clone());
        Ok(Self::new(Box::new(motion), Box::new(environmental)))
    }

    /// Both drivers on the Linux I2C device named in the config
    #[cfg(feature = "hardware")]
    pub fn hardware(config: &Config, delay: Arc<dyn Delay>) -> anyhow::Result<Self> {
        use super::bus::LinuxI2cBus;

        let bus = &config.bus;
        let motion = Bmi270::open(
            LinuxI2cBus::open(&bus.i2c_device, bus.motion_address)?,
            delay.clone(),
            bus.motion_init_blob.as_deref(),
        )?;
        let environmental = Bme688::new(
            LinuxI2cBus::open(&bus.i2c_device, bus.environmental_address)?,
            delay,
            config.acquisition.clone(),
        );
        Ok(Self::new(Box::new(motion), Box::new(environmental)))
    }

    /// Initialize every sensor. A failure is logged and left for the next
    /// read to retry; it never stops the others.
    pub async fn initialize_all(&mut self) -> usize {
        let mut ok = 0;
        for kind in [SensorKind::Motion, SensorKind::Environmental] {
            match self.source_mut(kind).initialize().await {
                Ok(()) => {
                    info!("{} ready", kind);
                    ok += 1;
                }
                Err(e) => error!("{} failed to initialize: {}", kind, e),
            }
        }
        ok
    }

    pub fn source_mut(&mut self, kind: SensorKind) -> &mut dyn SensorSource {
        match kind {
            SensorKind::Motion => self.motion.as_mut(),
            SensorKind::Environmental => self.environmental.as_mut(),
        }
    }

    /// Read one sample from `kind` and account for it
    pub async fn read(&mut self, kind: SensorKind) -> Result<Reading> {
        let result = self.source_mut(kind).read().await;
        let health = self.health_mut(kind);
        match &result {
            Ok(_) => health.record_success(),
            Err(e) => {
                health.record_error(e);
                debug!("{} read error ({} in a row): {}", kind, health.consecutive_errors, e);
            }
        }
        result
    }

    pub fn status(&self, kind: SensorKind) -> SensorStatus {
        match kind {
            SensorKind::Motion => self.motion.status(),
            SensorKind::Environmental => self.environmental.status(),
        }
    }

    pub fn health(&self, kind: SensorKind) -> &SensorHealth {
        match kind {
            SensorKind::Motion => &self.motion_health,
            SensorKind::Environmental => &self.environmental_health,
        }
    }

    fn health_mut(&mut self, kind: SensorKind) -> &mut SensorHealth {
        match kind {
            SensorKind::Motion => &mut self.motion_health,
            SensorKind::Environmental => &mut self.environmental_health,
        }
    }

    pub fn active_count(&self) -> usize {
        [SensorKind::Motion, SensorKind::Environmental]
            .iter()
            .filter(|k| self.status(**k) == SensorStatus::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::testing::RecordingDelay;
    use crate::sensors::EnvironmentalConfig;

    fn manager(env_faults: f64) -> SensorManager {
        let delay = Arc::new(RecordingDelay::default());
        let motion = Bmi270::new(SimulatedBmi270Bus::seeded(3), delay.clone());
        let env = Bme688::new(
            SimulatedBme688Bus::seeded(3).with_fault_probability(env_faults),
            delay,
            EnvironmentalConfig::default(),
        );
        SensorManager::new(Box::new(motion), Box::new(env))
    }

    #[tokio::test]
    async fn test_initialize_all_continues_past_failure() {
        let mut mgr = manager(1.0);
        assert_eq!(mgr.initialize_all().await, 1);
        assert_eq!(mgr.status(SensorKind::Motion), SensorStatus::Active);
        assert_eq!(mgr.status(SensorKind::Environmental), SensorStatus::Faulted);
        assert_eq!(mgr.active_count(), 1);
    }

    #[tokio::test]
    async fn test_read_tracks_health() {
        let mut mgr = manager(1.0);
        mgr.initialize_all().await;

        assert!(mgr.read(SensorKind::Motion).await.is_ok());
        assert!(mgr.read(SensorKind::Environmental).await.is_err());
        assert!(mgr.read(SensorKind::Environmental).await.is_err());

        assert_eq!(mgr.health(SensorKind::Motion).readings_count, 1);
        let env = mgr.health(SensorKind::Environmental);
        assert_eq!(env.error_count, 2);
        assert_eq!(env.consecutive_errors, 2);
        assert!(env.last_error.is_some());
    }
}
