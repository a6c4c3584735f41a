//! Processing pipeline - turns sensor readings into telemetry records

mod rms;

pub use rms::{RmsAccumulator, RmsSummary};

use std::time::Duration;
use tracing::{debug, trace};

use crate::control::{ProcessingMode, RuntimeConfig, SensorKind};
use crate::core::Delay;
use crate::error::ProcessingError;
use crate::sensors::{Reading, SensorManager};
use crate::streaming::TelemetryRecord;

/// Applies the configured processing mode to the active sensor
#[derive(Debug, Clone)]
pub struct ProcessingPipeline {
    sample_interval: Duration,
}

impl ProcessingPipeline {
    /// `sample_interval` is the spacing between samples of an RMS window
    pub fn new(sample_interval: Duration) -> Self {
        Self { sample_interval }
    }

    /// Produce one record for this cycle's configuration snapshot
    pub async fn process(
        &self,
        config: &RuntimeConfig,
        sensors: &mut SensorManager,
        delay: &dyn Delay,
    ) -> Result<TelemetryRecord, ProcessingError> {
        let sensor = config.active_sensor;
        match (config.processing_mode, sensor) {
            (ProcessingMode::Raw, _) | (ProcessingMode::Rms, SensorKind::Environmental) => {
                let reading = sensors.read(sensor).await?;
                Ok(TelemetryRecord::from_reading(&reading))
            }
            (ProcessingMode::Rms, SensorKind::Motion) => {
                self.rms_window(config.effective_window(), sensors, delay).await
            }
            (mode @ (ProcessingMode::Fft | ProcessingMode::Peak), _) => {
                Err(ProcessingError::ModeNotImplemented(mode))
            }
        }
    }

    async fn rms_window(
        &self,
        window: usize,
        sensors: &mut SensorManager,
        delay: &dyn Delay,
    ) -> Result<TelemetryRecord, ProcessingError> {
        let mut acc = RmsAccumulator::new();

        for _ in 0..window {
            match sensors.read(SensorKind::Motion).await {
                Ok(Reading::Motion { ax, ay, az, .. }) => acc.push(ax, ay, az),
                Ok(other) => {
                    debug!("Ignoring non-motion reading in RMS window: {:?}", other);
                    acc.skip();
                }
                Err(e) => {
                    trace!("RMS sample skipped: {}", e);
                    acc.skip();
                }
            }
            delay.delay(self.sample_interval).await;
        }

        let summary = acc.finish()?;
        debug!("RMS window closed: rms={:.3} N={}", summary.rms, summary.samples);
        Ok(TelemetryRecord::rms(SensorKind::Motion, summary))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;
    use crate::control::{Protocol, SensorKind};
    use crate::core::clock::testing::RecordingDelay;
    use crate::error::AcquisitionError;
    use crate::streaming::Payload;

    fn motion(ax: f32, ay: f32, az: f32) -> Reading {
        Reading::Motion { ax, ay, az, gx: 0.0, gy: 0.0, gz: 0.0 }
    }

    fn env_reading() -> Reading {
        Reading::Environmental {
            temperature_c: 21.0,
            pressure_pa: 100_000.0,
            humidity_pct: 40.0,
            gas_resistance_ohm: 1500.0,
        }
    }

    fn manager(motion_script: Vec<crate::error::Result<Reading>>) -> SensorManager {
        SensorManager::new(
            Box::new(ScriptedSource::new(SensorKind::Motion, motion_script)),
            Box::new(ScriptedSource::new(SensorKind::Environmental, vec![Ok(env_reading())])),
        )
    }

    fn config(sensor: SensorKind, mode: ProcessingMode, window: i64) -> RuntimeConfig {
        RuntimeConfig {
            active_sensor: sensor,
            protocol: Protocol::Udp,
            processing_mode: mode,
            window_size: window,
            threshold: 1000,
            ..RuntimeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_raw_passthrough() {
        let pipeline = ProcessingPipeline::new(Duration::from_millis(10));
        let delay = RecordingDelay::default();
        let mut sensors = manager(vec![Ok(motion(0.1, 0.2, 9.8))]);

        let record = pipeline
            .process(&config(SensorKind::Motion, ProcessingMode::Raw, 50), &mut sensors, &delay)
            .await
            .unwrap();
        assert_eq!(record, TelemetryRecord::from_reading(&motion(0.1, 0.2, 9.8)));
        assert_eq!(delay.total(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_rms_window_skips_failures() {
        let pipeline = ProcessingPipeline::new(Duration::from_millis(10));
        let delay = RecordingDelay::default();
        let mut sensors = manager(vec![
            Ok(motion(3.0, 0.0, 4.0)),
            Err(AcquisitionError::bus(0x0C, "nack")),
            Ok(motion(0.0, 4.0, 3.0)),
            Ok(motion(1.0, 1.0, 1.0)),
        ]);

        let record = pipeline
            .process(&config(SensorKind::Motion, ProcessingMode::Rms, 4), &mut sensors, &delay)
            .await
            .unwrap();

        // rms² per axis: 10/3, 17/3, 26/3
        let expected = ((10.0 + 17.0 + 26.0) / 3.0f32).sqrt();
        match record.payload {
            Payload::Rms { rms, n } => {
                assert!((rms - expected).abs() < 1e-4, "rms = {}", rms);
                assert_eq!(n, 3);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(record.mode, ProcessingMode::Rms);
        assert_eq!(delay.total(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_rms_all_failed_is_window_error() {
        let pipeline = ProcessingPipeline::new(Duration::from_millis(10));
        let delay = RecordingDelay::default();
        let mut sensors = manager(vec![]);

        let err = pipeline
            .process(&config(SensorKind::Motion, ProcessingMode::Rms, 0), &mut sensors, &delay)
            .await
            .unwrap_err();
        assert_eq!(err, ProcessingError::EmptyWindow { attempted: 10 });
    }

    #[tokio::test]
    async fn test_rms_window_stops_at_cap() {
        let pipeline = ProcessingPipeline::new(Duration::from_millis(10));
        let delay = RecordingDelay::default();
        let mut sensors = manager(vec![]);
        let mut cfg = config(SensorKind::Motion, ProcessingMode::Rms, i64::MAX);
        cfg.max_window_size = 20;

        let err = pipeline.process(&cfg, &mut sensors, &delay).await.unwrap_err();
        assert_eq!(err, ProcessingError::EmptyWindow { attempted: 20 });
        assert_eq!(delay.total(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_environmental_rms_falls_back_to_raw() {
        let pipeline = ProcessingPipeline::new(Duration::from_millis(10));
        let delay = RecordingDelay::default();
        let mut sensors = manager(vec![]);

        let record = pipeline
            .process(&config(SensorKind::Environmental, ProcessingMode::Rms, 50), &mut sensors, &delay)
            .await
            .unwrap();
        assert_eq!(record.mode, ProcessingMode::Raw);
        assert_eq!(record.sensor, SensorKind::Environmental);
    }

    #[tokio::test]
    async fn test_fft_and_peak_are_not_aliased_to_raw() {
        let pipeline = ProcessingPipeline::new(Duration::from_millis(10));
        let delay = RecordingDelay::default();
        let mut sensors = manager(vec![Ok(motion(0.0, 0.0, 9.8))]);

        for mode in [ProcessingMode::Fft, ProcessingMode::Peak] {
            let err = pipeline
                .process(&config(SensorKind::Motion, mode, 50), &mut sensors, &delay)
                .await
                .unwrap_err();
            assert_eq!(err, ProcessingError::ModeNotImplemented(mode));
        }
    }
}
