// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Control + streaming network session
//!
//! The control channel is a TCP connection that carries inbound commands and,
//! when the runtime protocol is TCP, outbound records. The streaming channel is
//! a connected UDP socket. Each channel moves through
//! `Disconnected -> Connecting -> Connected` on its own.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, warn};

use super::NetworkConfig;
use crate::control::{drain_lines, Protocol};
use crate::core::Delay;
use crate::error::SessionError;

/// Connection state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Reliable, ordered control connection
#[async_trait]
pub trait ControlTransport: Send {
    /// Non-blocking receive. `Ok(None)` when nothing is pending, `Ok(Some(0))` on EOF.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    async fn send(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Best-effort datagram channel
#[async_trait]
pub trait DatagramTransport: Send {
    async fn send(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Opens the two channels
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_control(&self) -> io::Result<Box<dyn ControlTransport>>;

    async fn open_datagram(&self) -> io::Result<Box<dyn DatagramTransport>>;
}

struct TcpControl {
    stream: TcpStream,
}

#[async_trait]
impl ControlTransport for TcpControl {
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.stream.try_read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await
    }
}

struct UdpStream {
    socket: UdpSocket,
}

#[async_trait]
impl DatagramTransport for UdpStream {
    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.socket.send(data).await.map(|_| ())
    }
}

/// Connector backed by tokio sockets
pub struct TokioConnector {
    config: NetworkConfig,
}

impl TokioConnector {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TokioConnector {
    async fn connect_control(&self) -> io::Result<Box<dyn ControlTransport>> {
        let addr = (self.config.server_host.as_str(), self.config.control_port);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "control connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpControl { stream }))
    }

    async fn open_datagram(&self) -> io::Result<Box<dyn DatagramTransport>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .connect((self.config.server_host.as_str(), self.config.stream_port))
            .await?;
        Ok(Box::new(UdpStream { socket }))
    }
}

/// Owns both channels and their reconnect policy
pub struct TelemetrySession {
    connector: Box<dyn Connector>,
    delay: Arc<dyn Delay>,
    backoff: Duration,
    rx_buffer_size: usize,

    control: Option<Box<dyn ControlTransport>>,
    stream: Option<Box<dyn DatagramTransport>>,
    control_state: ChannelState,
    stream_state: ChannelState,
    /// Set after a control failure; the next connect attempt waits `backoff` first
    backoff_pending: bool,
    pending: Vec<u8>,
}

impl TelemetrySession {
    pub fn new(connector: Box<dyn Connector>, delay: Arc<dyn Delay>, config: &NetworkConfig) -> Self {
        Self {
            connector,
            delay,
            backoff: Duration::from_millis(config.reconnect_backoff_ms),
            rx_buffer_size: config.rx_buffer_size.max(1),
            control: None,
            stream: None,
            control_state: ChannelState::Disconnected,
            stream_state: ChannelState::Disconnected,
            backoff_pending: false,
            pending: Vec::new(),
        }
    }

    pub fn control_state(&self) -> ChannelState {
        self.control_state
    }

    pub fn stream_state(&self) -> ChannelState {
        self.stream_state
    }

    /// Bring up whichever channel is down. Returns whether the control channel is usable.
    pub async fn ensure_connected(&mut self) -> bool {
        if self.stream.is_none() {
            self.stream_state = ChannelState::Connecting;
            match self.connector.open_datagram().await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.stream_state = ChannelState::Connected;
                    info!("Streaming channel open");
                }
                Err(e) => {
                    self.stream_state = ChannelState::Disconnected;
                    warn!("Failed to open streaming channel: {}", e);
                }
            }
        }

        if self.control.is_none() {
            if self.backoff_pending {
                info!("Reconnecting control channel in {:?}", self.backoff);
                self.delay.delay(self.backoff).await;
            }
            self.control_state = ChannelState::Connecting;
            match self.connector.connect_control().await {
                Ok(control) => {
                    self.control = Some(control);
                    self.control_state = ChannelState::Connected;
                    self.backoff_pending = false;
                    info!("Control channel connected");
                }
                Err(e) => {
                    self.control_state = ChannelState::Disconnected;
                    self.backoff_pending = true;
                    warn!("Control connect failed: {}", e);
                }
            }
        }

        self.control_state == ChannelState::Connected
    }

    /// Collect complete control messages without blocking
    pub fn poll_commands(&mut self) -> Vec<String> {
        let Some(control) = self.control.as_mut() else {
            return Vec::new();
        };

        let mut buf = vec![0u8; self.rx_buffer_size];
        match control.try_recv(&mut buf) {
            Ok(None) => Vec::new(),
            Ok(Some(0)) => {
                self.drop_control("closed by peer");
                Vec::new()
            }
            Ok(Some(n)) => {
                debug!("Received {} control bytes", n);
                self.pending.extend_from_slice(&buf[..n]);
                drain_lines(&mut self.pending, self.rx_buffer_size)
            }
            Err(e) => {
                self.drop_control(&e.to_string());
                Vec::new()
            }
        }
    }

    /// Send one record line over the channel `protocol` selects.
    ///
    /// A TCP failure tears down the control channel and is returned. A UDP
    /// failure is logged and the record dropped.
    pub async fn send(&mut self, line: &str, protocol: Protocol) -> Result<(), SessionError> {
        match protocol {
            Protocol::Tcp => {
                let control = self.control.as_mut().ok_or(SessionError::NotConnected)?;
                if let Err(e) = control.send(line.as_bytes()).await {
                    self.drop_control(&e.to_string());
                    return Err(SessionError::ConnectionLost(e));
                }
                Ok(())
            }
            Protocol::Udp => {
                match self.stream.as_mut() {
                    Some(stream) => {
                        if let Err(e) = stream.send(line.as_bytes()).await {
                            warn!("UDP send failed, record dropped: {}", e);
                        }
                    }
                    None => debug!("Streaming channel not open, record dropped"),
                }
                Ok(())
            }
        }
    }

    fn drop_control(&mut self, reason: &str) {
        warn!("Control connection lost ({}), reconnecting", reason);
        self.control = None;
        self.control_state = ChannelState::Disconnected;
        self.backoff_pending = true;
        self.pending.clear();
    }
}
