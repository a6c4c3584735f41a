// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Inbound control messages
//!
//! A message is a JSON object such as
//! `{"cmd":"config","sensor":"BME688","protocol":"TCP","type":"RMS","window_size":100}`.
//! Fields are applied one by one: an unknown value for one field does not stop
//! the others from taking effect. Anything that is not a `config` command is
//! dropped without touching the configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ProcessingMode, Protocol, RuntimeConfig, SensorKind, SharedRuntimeConfig};

/// The only command name that mutates configuration
pub const CONFIG_COMMAND: &str = "config";

/// Outgoing form of a configuration command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCommand {
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub processing_mode: Option<ProcessingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
}

impl ConfigCommand {
    pub fn new() -> Self {
        Self {
            cmd: CONFIG_COMMAND.to_string(),
            ..Default::default()
        }
    }

    /// Newline-terminated wire form
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Recognized config command; carries the names of the fields that changed
    Applied {
        changed: Vec<&'static str>,
        config: RuntimeConfig,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    InvalidJson,
    NotAnObject,
    MissingCommand,
    UnknownCommand(String),
}

/// Decodes control messages and applies them to the shared runtime config
#[derive(Debug, Clone)]
pub struct CommandChannel {
    config: SharedRuntimeConfig,
}

impl CommandChannel {
    pub fn new(config: SharedRuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SharedRuntimeConfig {
        &self.config
    }

    /// Handle one message. Never fails: malformed input is logged and ignored.
    pub fn handle(&self, message: &str) -> CommandOutcome {
        let outcome = self.decode_and_apply(message.trim());
        match &outcome {
            CommandOutcome::Applied { changed, config } => {
                warn!(
                    "Configuration updated ({}): sensor={:?} protocol={:?} type={:?} window={} threshold={}",
                    if changed.is_empty() { "no changes".to_string() } else { changed.join(", ") },
                    config.active_sensor,
                    config.protocol,
                    config.processing_mode,
                    config.window_size,
                    config.threshold
                );
                if changed.contains(&"window_size") && config.effective_window() as i64 != config.window_size {
                    warn!(
                        "window_size {} out of range, RMS windows will use {} samples",
                        config.window_size,
                        config.effective_window()
                    );
                }
            }
            CommandOutcome::Ignored(reason) => {
                warn!("Ignoring control message ({:?}): {}", reason, message.trim());
            }
        }
        outcome
    }

    fn decode_and_apply(&self, message: &str) -> CommandOutcome {
        let root: Value = match serde_json::from_str(message) {
            Ok(v) => v,
            Err(_) => return CommandOutcome::Ignored(IgnoreReason::InvalidJson),
        };
        let Some(fields) = root.as_object() else {
            return CommandOutcome::Ignored(IgnoreReason::NotAnObject);
        };

        match fields.get("cmd").and_then(|v| v.as_str()) {
            Some(CONFIG_COMMAND) => {}
            Some(other) => {
                return CommandOutcome::Ignored(IgnoreReason::UnknownCommand(other.to_string()))
            }
            None => return CommandOutcome::Ignored(IgnoreReason::MissingCommand),
        }

        let mut changed = Vec::new();
        let config = self.config.update(|cfg| {
            if let Some(sensor) = fields.get("sensor").and_then(|v| v.as_str()).and_then(SensorKind::from_wire) {
                if cfg.active_sensor != sensor {
                    cfg.active_sensor = sensor;
                    changed.push("sensor");
                }
            }
            if let Some(protocol) = fields.get("protocol").and_then(|v| v.as_str()).and_then(Protocol::from_wire) {
                if cfg.protocol != protocol {
                    cfg.protocol = protocol;
                    changed.push("protocol");
                }
            }
            if let Some(mode) = fields.get("type").and_then(|v| v.as_str()).and_then(ProcessingMode::from_wire) {
                if cfg.processing_mode != mode {
                    cfg.processing_mode = mode;
                    changed.push("type");
                }
            }
            if let Some(window) = fields.get("window_size").and_then(as_integer) {
                if cfg.window_size != window {
                    cfg.window_size = window;
                    changed.push("window_size");
                }
            }
            if let Some(threshold) = fields.get("threshold").and_then(as_integer) {
                if cfg.threshold != threshold {
                    cfg.threshold = threshold;
                    changed.push("threshold");
                }
            }
        });

        debug!("Applied config command, changed fields: {:?}", changed);
        CommandOutcome::Applied { changed, config }
    }
}

/// Any JSON number, fractional values truncated toward zero
fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

/// Split complete messages out of a receive buffer.
///
/// Newline-terminated lines are taken first. Whatever follows the last newline
/// is taken too once it holds complete JSON values, so a peer that sends one
/// unterminated object per write still gets its command applied. A partial
/// value stays in `pending` for the next read; text that can never become
/// JSON, or a tail grown beyond `max_pending`, is flushed as one message.
pub fn drain_lines(pending: &mut Vec<u8>, max_pending: usize) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        push_text(&mut lines, &line);
    }

    let mut consumed = 0;
    let mut garbage = false;
    {
        let mut values = serde_json::Deserializer::from_slice(pending).into_iter::<Value>();
        loop {
            match values.next() {
                Some(Ok(_)) => {
                    let end = values.byte_offset();
                    push_text(&mut lines, &pending[consumed..end]);
                    consumed = end;
                }
                Some(Err(e)) => {
                    garbage = !e.is_eof();
                    break;
                }
                None => break,
            }
        }
    }
    pending.drain(..consumed);

    if garbage || pending.len() >= max_pending {
        if !garbage {
            info!("Control message exceeded {} bytes without newline", max_pending);
        }
        let rest = std::mem::take(pending);
        push_text(&mut lines, &rest);
    }

    lines
}

fn push_text(lines: &mut Vec<String>, bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if !text.is_empty() {
        lines.push(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> CommandChannel {
        CommandChannel::new(SharedRuntimeConfig::default())
    }

    #[test]
    fn test_protocol_only_changes_protocol() {
        let ch = channel();
        let before = ch.config().snapshot();

        let outcome = ch.handle(r#"{"cmd":"config","protocol":"TCP"}"#);
        let after = ch.config().snapshot();

        assert!(matches!(outcome, CommandOutcome::Applied { ref changed, .. } if changed == &vec!["protocol"]));
        assert_eq!(after.protocol, Protocol::Tcp);
        assert_eq!(after.active_sensor, before.active_sensor);
        assert_eq!(after.processing_mode, before.processing_mode);
        assert_eq!(after.window_size, before.window_size);
        assert_eq!(after.threshold, before.threshold);
    }

    #[test]
    fn test_missing_or_foreign_cmd_is_ignored() {
        let ch = channel();
        let before = ch.config().snapshot();

        assert_eq!(
            ch.handle(r#"{"protocol":"TCP","sensor":"BME688"}"#),
            CommandOutcome::Ignored(IgnoreReason::MissingCommand)
        );
        assert_eq!(
            ch.handle(r#"{"cmd":"reboot","protocol":"TCP"}"#),
            CommandOutcome::Ignored(IgnoreReason::UnknownCommand("reboot".to_string()))
        );
        assert_eq!(
            ch.handle(r#"{"cmd":"config","protocol":"#),
            CommandOutcome::Ignored(IgnoreReason::InvalidJson)
        );
        assert_eq!(ch.handle("[1,2]"), CommandOutcome::Ignored(IgnoreReason::NotAnObject));

        assert_eq!(ch.config().snapshot(), before);
    }

    #[test]
    fn test_bad_fields_ignored_individually() {
        let ch = channel();
        ch.handle(r#"{"cmd":"config","sensor":"BME999","type":"RMS","window_size":"big","threshold":12.9}"#);

        let cfg = ch.config().snapshot();
        assert_eq!(cfg.active_sensor, SensorKind::Motion);
        assert_eq!(cfg.processing_mode, ProcessingMode::Rms);
        assert_eq!(cfg.window_size, 50);
        assert_eq!(cfg.threshold, 12);
    }

    #[test]
    fn test_full_command_and_negative_window_accepted() {
        let ch = channel();
        ch.handle(r#"{"cmd":"config","sensor":"BME688","protocol":"TCP","type":"FFT","window_size":-3,"threshold":7}"#);

        let cfg = ch.config().snapshot();
        assert_eq!(cfg.active_sensor, SensorKind::Environmental);
        assert_eq!(cfg.protocol, Protocol::Tcp);
        assert_eq!(cfg.processing_mode, ProcessingMode::Fft);
        assert_eq!(cfg.window_size, -3);
        assert_eq!(cfg.effective_window(), crate::control::MIN_WINDOW_SIZE);
        assert_eq!(cfg.threshold, 7);
    }

    #[test]
    fn test_huge_window_is_bounded() {
        let ch = channel();
        ch.handle(r#"{"cmd":"config","type":"RMS","window_size":1e300}"#);

        let cfg = ch.config().snapshot();
        assert_eq!(cfg.processing_mode, ProcessingMode::Rms);
        assert_eq!(cfg.window_size, i64::MAX);
        assert_eq!(cfg.effective_window(), crate::control::DEFAULT_MAX_WINDOW_SIZE as usize);

        // A command cannot lift the cap
        ch.handle(r#"{"cmd":"config","max_window_size":1000000}"#);
        assert_eq!(ch.config().snapshot().max_window_size, crate::control::DEFAULT_MAX_WINDOW_SIZE);
    }

    #[test]
    fn test_config_command_line_decodes_back() {
        let mut cmd = ConfigCommand::new();
        cmd.sensor = Some(SensorKind::Environmental);
        cmd.processing_mode = Some(ProcessingMode::Raw);
        let line = cmd.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""type":"RAW""#));
        assert!(!line.contains("threshold"));

        let ch = channel();
        ch.handle(&line);
        assert_eq!(ch.config().snapshot().active_sensor, SensorKind::Environmental);
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut pending = b"{\"a\":1}\n\n{\"b\":2}\n{\"c\"".to_vec();
        let lines = drain_lines(&mut pending, 256);
        assert_eq!(lines, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
        assert_eq!(pending, b"{\"c\"".to_vec());
    }

    #[test]
    fn test_drain_lines_flushes_oversized_tail() {
        let mut pending = b"{\"cmd\":\"config\",\"sensor\"".to_vec();
        let lines = drain_lines(&mut pending, 8);
        assert_eq!(lines, vec!["{\"cmd\":\"config\",\"sensor\"".to_string()]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_drain_lines_takes_unterminated_objects() {
        let mut pending = br#"{"cmd":"config","protocol":"TCP"}"#.to_vec();
        assert_eq!(drain_lines(&mut pending, 256), vec![r#"{"cmd":"config","protocol":"TCP"}"#.to_string()]);
        assert!(pending.is_empty());

        let mut pending = br#"{"a":1} {"b":2}{"c""#.to_vec();
        assert_eq!(
            drain_lines(&mut pending, 256),
            vec![r#"{"a":1}"#.to_string(), r#"{"b":2}"#.to_string()]
        );
        assert_eq!(pending, br#"{"c""#.to_vec());
    }

    #[test]
    fn test_drain_lines_flushes_text_that_is_not_json() {
        let mut pending = b"hello".to_vec();
        assert_eq!(drain_lines(&mut pending, 256), vec!["hello".to_string()]);
        assert!(pending.is_empty());
    }
}
