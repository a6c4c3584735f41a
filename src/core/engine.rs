//! Main telemetry engine - one sequential connect/command/sense/process/send loop

use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::control::{CommandChannel, ProcessingMode, Protocol, SensorKind, SharedRuntimeConfig};
use crate::error::ProcessingError;
use crate::processing::ProcessingPipeline;
use crate::sensors::SensorManager;
use crate::streaming::{ChannelState, TelemetrySession};
use super::{Delay, SystemState};

/// Loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after a RAW record was sent
    pub raw_interval_ms: u64,
    /// Pause after a failed acquisition or processing step
    pub error_backoff_ms: u64,
    /// Spacing between the samples of an RMS window
    pub rms_sample_interval_ms: u64,
    /// How often sensor health is logged
    pub health_log_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            raw_interval_ms: 100,
            error_backoff_ms: 500,
            rms_sample_interval_ms: 10,
            health_log_secs: 60,
        }
    }
}

/// What one cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    Sent {
        sensor: SensorKind,
        /// Mode of the record that went out
        mode: ProcessingMode,
        /// Mode the runtime config asked for; differs for BME688 in RMS
        requested: ProcessingMode,
        protocol: Protocol,
    },
    /// Acquisition or processing failed; nothing was sent
    Failed(ProcessingError),
    /// Record produced but the control channel dropped while sending it
    SendFailed,
    /// Control channel is down; the cycle was skipped
    Disconnected,
}

/// Main edgelink engine
pub struct Engine {
    sensors: SensorManager,
    session: TelemetrySession,
    commands: CommandChannel,
    pipeline: ProcessingPipeline,
    delay: Arc<dyn Delay>,
    timing: TimingConfig,
    state: SystemState,
    start_time: Instant,
    last_health_log: Instant,
}

impl Engine {
    pub fn new(
        sensors: SensorManager,
        session: TelemetrySession,
        config: SharedRuntimeConfig,
        delay: Arc<dyn Delay>,
        timing: TimingConfig,
    ) -> Self {
        let pipeline = ProcessingPipeline::new(Duration::from_millis(timing.rms_sample_interval_ms));
        Self {
            sensors,
            session,
            commands: CommandChannel::new(config),
            pipeline,
            delay,
            timing,
            state: SystemState::default(),
            start_time: Instant::now(),
            last_health_log: Instant::now(),
        }
    }

    pub fn runtime_config(&self) -> &SharedRuntimeConfig {
        self.commands.config()
    }

    pub fn sensors(&self) -> &SensorManager {
        &self.sensors
    }

    pub fn session(&self) -> &TelemetrySession {
        &self.session
    }

    pub fn state(&self) -> SystemState {
        let mut state = self.state.clone();
        state.sensors_active = self.sensors.active_count();
        state.uptime_seconds = self.start_time.elapsed().as_secs();
        state
    }

    /// Run one cycle: connect, apply commands, sense, process, send.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state.cycles += 1;

        let was_connected = self.session.control_state() == ChannelState::Connected;
        if !self.session.ensure_connected().await {
            return CycleOutcome::Disconnected;
        }
        if !was_connected && self.state.cycles > 1 {
            self.state.reconnects += 1;
        }

        for line in self.session.poll_commands() {
            info!("Command received: {}", line);
            self.commands.handle(&line);
        }
        if self.session.control_state() != ChannelState::Connected {
            return CycleOutcome::Disconnected;
        }

        // Everything below sees one consistent configuration
        let snapshot = self.commands.config().snapshot();

        let record = match self
            .pipeline
            .process(&snapshot, &mut self.sensors, self.delay.as_ref())
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!("{} cycle failed: {}", snapshot.active_sensor, e);
                self.state.cycle_failures += 1;
                return CycleOutcome::Failed(e);
            }
        };

        let line = match record.to_line() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode record: {}", e);
                self.state.cycle_failures += 1;
                return CycleOutcome::SendFailed;
            }
        };

        match self.session.send(&line, snapshot.protocol).await {
            Ok(()) => {
                debug!("Sent over {:?}: {}", snapshot.protocol, line.trim_end());
                self.state.records_sent += 1;
                CycleOutcome::Sent {
                    sensor: record.sensor,
                    mode: record.mode,
                    requested: snapshot.processing_mode,
                    protocol: snapshot.protocol,
                }
            }
            Err(e) => {
                error!("Telemetry send failed: {}", e);
                CycleOutcome::SendFailed
            }
        }
    }

    /// Pause before the next cycle
    pub fn pause_after(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Sent { requested: ProcessingMode::Raw, .. } => {
                Duration::from_millis(self.timing.raw_interval_ms)
            }
            CycleOutcome::Sent { .. } => Duration::ZERO,
            CycleOutcome::Failed(_) => Duration::from_millis(self.timing.error_backoff_ms),
            // Reconnect backoff is applied by the session itself
            CycleOutcome::SendFailed | CycleOutcome::Disconnected => Duration::ZERO,
        }
    }

    /// Run until `shutdown` fires. A cycle always completes; shutdown is
    /// observed in the pause between cycles.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("Starting edgelink engine...");
        self.state.running = true;

        let ready = self.sensors.initialize_all().await;
        info!("{} of 2 sensors ready", ready);

        loop {
            let outcome = self.run_cycle().await;
            let pause = self.pause_after(&outcome);
            self.log_health();

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Engine shutting down...");
                    break;
                }
                _ = self.delay.delay(pause) => {}
            }
        }

        self.state.running = false;
        let state = self.state();
        info!(
            "Engine stopped after {} cycles ({} records sent, {} failures)",
            state.cycles, state.records_sent, state.cycle_failures
        );
        Ok(())
    }

    fn log_health(&mut self) {
        if self.last_health_log.elapsed() < Duration::from_secs(self.timing.health_log_secs) {
            return;
        }
        self.last_health_log = Instant::now();

        for kind in [SensorKind::Motion, SensorKind::Environmental] {
            let h = self.sensors.health(kind);
            info!(
                "{} health: status={:?} readings={} errors={} last_error={:?}",
                kind,
                self.sensors.status(kind),
                h.readings_count,
                h.error_count,
                h.last_error
            );
        }
    }
}
