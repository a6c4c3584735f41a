// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! edgelink collector - the server end of the bridge
//!
//! Accepts the device's TCP control connection, receives newline-delimited
//! records over TCP and UDP, and logs every decoded record. Optionally pushes
//! one configuration command to each device that connects.
//!
//! While running, every line typed on stdin is forwarded to all connected
//! devices. A line is either raw JSON or `key=value` shorthand:
//!
//! ```text
//! sensor=BME688 protocol=TCP
//! type=RMS window_size=200
//! ```

use std::net::SocketAddr;
use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use edgelink::control::{ConfigCommand, ProcessingMode, Protocol, SensorKind};
use edgelink::{TelemetryRecord, VERSION};

/// edgelink collector
#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Receive edgelink telemetry and push configuration commands")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// TCP and UDP port
    #[arg(short, long, default_value = "1234")]
    port: u16,

    /// Sensor to select on connect (BMI270 or BME688)
    #[arg(long)]
    sensor: Option<String>,

    /// Telemetry protocol to select on connect (TCP or UDP)
    #[arg(long)]
    protocol: Option<String>,

    /// Processing mode to select on connect (RAW, RMS, FFT, PEAK)
    #[arg(long = "type")]
    mode: Option<String>,

    /// RMS window size
    #[arg(long)]
    window_size: Option<i64>,

    /// Threshold
    #[arg(long)]
    threshold: Option<i64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Command pushed to each new device, if any option was given
    fn command(&self) -> Result<Option<ConfigCommand>> {
        let mut cmd = ConfigCommand::new();
        let fields = [
            ("sensor", self.sensor.clone()),
            ("protocol", self.protocol.clone()),
            ("type", self.mode.clone()),
            ("window_size", self.window_size.map(|v| v.to_string())),
            ("threshold", self.threshold.map(|v| v.to_string())),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                set_field(&mut cmd, key, &value)?;
            }
        }

        let empty = ConfigCommand::new();
        Ok(if cmd == empty { None } else { Some(cmd) })
    }
}

fn set_field(cmd: &mut ConfigCommand, key: &str, value: &str) -> Result<()> {
    match key {
        "sensor" => {
            cmd.sensor = Some(SensorKind::from_wire(value).ok_or_else(|| anyhow!("Unknown sensor: {}", value))?)
        }
        "protocol" => {
            cmd.protocol = Some(Protocol::from_wire(value).ok_or_else(|| anyhow!("Unknown protocol: {}", value))?)
        }
        "type" => {
            cmd.processing_mode =
                Some(ProcessingMode::from_wire(value).ok_or_else(|| anyhow!("Unknown type: {}", value))?)
        }
        "window_size" => cmd.window_size = Some(value.parse().map_err(|_| anyhow!("Bad window_size: {}", value))?),
        "threshold" => cmd.threshold = Some(value.parse().map_err(|_| anyhow!("Bad threshold: {}", value))?),
        other => return Err(anyhow!("Unknown field: {}", other)),
    }
    Ok(())
}

/// Turn one operator input line into a newline-terminated wire message
fn operator_line(input: &str) -> Result<Option<String>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    if input.starts_with('{') {
        serde_json::from_str::<serde_json::Value>(input).map_err(|e| anyhow!("Invalid JSON: {}", e))?;
        return Ok(Some(format!("{}\n", input)));
    }

    let mut cmd = ConfigCommand::new();
    for token in input.split_whitespace() {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected key=value, got {:?}", token))?;
        set_field(&mut cmd, key, value)?;
    }
    Ok(Some(cmd.to_line()?))
}

async fn read_operator_commands(commands: broadcast::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(input)) => match operator_line(&input) {
                Ok(Some(line)) => match commands.send(line) {
                    Ok(n) => info!("Command queued for {} device(s)", n),
                    Err(_) => warn!("No device connected, command dropped"),
                },
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            },
            Ok(None) => {
                debug!("stdin closed, operator commands disabled");
                break;
            }
            Err(e) => {
                warn!("stdin read error: {}", e);
                break;
            }
        }
    }
}

fn log_record(line: &str, via: &str, peer: SocketAddr) {
    match TelemetryRecord::decode_line(line) {
        Ok(record) => info!("[{} {}] {} {:?} {:?}", via, peer, record.sensor, record.mode, record.payload),
        Err(e) => warn!("[{} {}] undecodable line ({}): {}", via, peer, e, line.trim()),
    }
}

async fn handle_device(
    stream: TcpStream,
    peer: SocketAddr,
    push: Option<String>,
    mut commands: broadcast::Receiver<String>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("Device connected: {}", peer);
    let (read_half, mut write_half) = stream.into_split();

    if let Some(line) = push {
        match write_half.write_all(line.as_bytes()).await {
            Ok(()) => info!("Sent to {}: {}", peer, line.trim_end()),
            Err(e) => {
                error!("Failed to send command to {}: {}", peer, e);
                return;
            }
        }
    }

    let mut lines = BufReader::new(read_half).lines();
    let mut operator_open = true;
    loop {
        tokio::select! {
            cmd = commands.recv(), if operator_open => match cmd {
                Ok(line) => {
                    if let Err(e) = write_half.write_all(line.as_bytes()).await {
                        warn!("Failed to send command to {}: {}", peer, e);
                        break;
                    }
                    info!("Sent to {}: {}", peer, line.trim_end());
                }
                Err(RecvError::Lagged(n)) => warn!("{} operator commands skipped for {}", n, peer),
                Err(RecvError::Closed) => operator_open = false,
            },
            next = lines.next_line() => match next {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => log_record(&line, "tcp", peer),
                Ok(None) => {
                    info!("Device disconnected: {}", peer);
                    break;
                }
                Err(e) => {
                    warn!("Connection error from {}: {}", peer, e);
                    break;
                }
            },
            _ = shutdown.recv() => break,
        }
    }
}

async fn serve_udp(socket: UdpSocket, mut shutdown: broadcast::Receiver<()>) {
    let mut buf = vec![0u8; 2048];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, peer)) => {
                    let text = String::from_utf8_lossy(&buf[..n]);
                    for line in text.lines().filter(|l| !l.trim().is_empty()) {
                        log_record(line, "udp", peer);
                    }
                }
                Err(e) => debug!("UDP receive error: {}", e),
            },
            _ = shutdown.recv() => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let push = args.command()?.map(|cmd| cmd.to_line()).transpose()?;

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = TcpListener::bind(&addr).await?;
    let udp = UdpSocket::bind(&addr).await?;
    info!("edgelink collector v{} listening on tcp/udp {}", VERSION, addr);
    if let Some(line) = &push {
        info!("Will push on connect: {}", line.trim_end());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (commands_tx, _) = broadcast::channel::<String>(16);
    tokio::spawn(serve_udp(udp, shutdown_tx.subscribe()));
    tokio::spawn(read_operator_commands(commands_tx.clone()));

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_device(
                        stream,
                        peer,
                        push.clone(),
                        commands_tx.subscribe(),
                        shutdown_tx.subscribe(),
                    ));
                }
                Err(e) => error!("Accept error: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Collector shutting down...");
                let _ = shutdown_tx.send(());
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelink::control::{CommandChannel, SharedRuntimeConfig};

    #[test]
    fn test_operator_shorthand() {
        let line = operator_line("sensor=BME688 type=RMS window_size=200").unwrap().unwrap();
        assert!(line.ends_with('\n'));

        let ch = CommandChannel::new(SharedRuntimeConfig::default());
        ch.handle(&line);
        let cfg = ch.config().snapshot();
        assert_eq!(cfg.active_sensor, SensorKind::Environmental);
        assert_eq!(cfg.processing_mode, ProcessingMode::Rms);
        assert_eq!(cfg.window_size, 200);
    }

    #[test]
    fn test_operator_line_validation() {
        assert_eq!(operator_line("   ").unwrap(), None);
        assert_eq!(
            operator_line(r#"{"cmd":"config","protocol":"TCP"}"#).unwrap(),
            Some("{\"cmd\":\"config\",\"protocol\":\"TCP\"}\n".to_string())
        );
        assert!(operator_line(r#"{"cmd":"#).is_err());
        assert!(operator_line("sensor=BME999").is_err());
        assert!(operator_line("protocol").is_err());
        assert!(operator_line("color=red").is_err());
    }

    #[tokio::test]
    async fn test_commands_forwarded_mid_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands_tx, commands_rx) = broadcast::channel::<String>(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_device(stream, peer, None, commands_rx, shutdown_rx).await;
        });

        let device = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = device.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // Device streams a record first, then the operator switches it over
        write_half
            .write_all(b"{\"sensor\":\"BMI270\",\"type\":\"RAW\",\"ax\":0.0,\"ay\":0.0,\"az\":9.8,\"gx\":0.0,\"gy\":0.0,\"gz\":0.0}\n")
            .await
            .unwrap();

        let channel = CommandChannel::new(SharedRuntimeConfig::default());
        for input in ["protocol=TCP", "sensor=BME688 type=RAW"] {
            commands_tx.send(operator_line(input).unwrap().unwrap()).unwrap();
            let line = tokio::time::timeout(std::time::Duration::from_secs(5), lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            channel.handle(&line);
        }

        let cfg = channel.config().snapshot();
        assert_eq!(cfg.protocol, Protocol::Tcp);
        assert_eq!(cfg.active_sensor, SensorKind::Environmental);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }
}
