//! ADB server transport
//!
//! Every request opens its own socket to the host-side ADB server: the
//! host protocol dedicates a connection to each service, so shell commands
//! and property fetches issued against the same device never share a stream.

use std::sync::Arc;
use std::time::Duration;

use adb_shared::codec::{self, LineDecoder, Status};
use adb_shared::{is_safe_argument, net, serial, timeouts};
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::traits::{BridgeCoordinator, DeviceChannel, PropertyReply};
use super::TransportError;
use crate::command::ResultCollector;

/// Configuration for reaching the ADB server
#[derive(Debug, Clone)]
pub struct AdbServerConfig {
    /// Server address (`host:port`)
    pub address: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Longest silence tolerated while a shell command streams output
    pub shell_timeout: Option<Duration>,
}

impl Default for AdbServerConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", net::ADB_SERVER_PORT),
            connect_timeout: Duration::from_millis(timeouts::SERVER_CONNECT_MS),
            shell_timeout: None,
        }
    }
}

impl AdbServerConfig {
    /// Default configuration with the server port taken from the environment
    pub fn from_env() -> Self {
        Self::with_port_override(std::env::var(net::ADB_SERVER_PORT_ENV).ok().as_deref())
    }

    /// Default configuration, with the server port replaced by `value` when it
    /// is a valid port number
    fn with_port_override(value: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(value) = value {
            match value.trim().parse::<u16>() {
                Ok(port) => config.address = format!("127.0.0.1:{}", port),
                Err(_) => warn!(
                    "[ADB] Ignoring {}={:?}: not a port number",
                    net::ADB_SERVER_PORT_ENV,
                    value
                ),
            }
        }
        config
    }
}

/// One socket to the ADB server, carrying a single service request
struct ServerConnection {
    stream: TcpStream,
    /// Bytes read past the last decoded status
    buffer: BytesMut,
}

impl ServerConnection {
    async fn open(config: &AdbServerConfig) -> Result<Self, TransportError> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(&config.address))
            .await
            .map_err(|_| TransportError::ConnectTimeout(config.address.clone()))??;

        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
        })
    }

    /// Open a connection already switched to the given device
    async fn open_transport(
        config: &AdbServerConfig,
        serial: &str,
    ) -> Result<Self, TransportError> {
        let mut conn = Self::open(config).await?;
        conn.request(&format!("host:transport:{}", serial)).await?;
        Ok(conn)
    }

    /// Send a request and wait for its status
    async fn request(&mut self, payload: &str) -> Result<(), TransportError> {
        let encoded = codec::encode_request(payload)?;
        self.stream.write_all(&encoded).await?;

        loop {
            match codec::decode_status(&mut self.buffer)? {
                Some(Status::Okay) => return Ok(()),
                Some(Status::Fail(message)) => {
                    return Err(TransportError::Refused {
                        request: payload.to_string(),
                        message,
                    });
                }
                None => {
                    if self.stream.read_buf(&mut self.buffer).await? == 0 {
                        return Err(TransportError::Closed);
                    }
                }
            }
        }
    }

    /// Read one hex-length-prefixed reply
    async fn read_length_prefixed(&mut self) -> Result<String, TransportError> {
        loop {
            if let Some(text) = codec::decode_length_prefixed(&mut self.buffer)? {
                return Ok(text);
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    /// Read until the server closes the socket
    async fn read_to_end(mut self, idle: Option<Duration>) -> Result<String, TransportError> {
        let mut data = self.buffer.split().to_vec();
        match idle {
            Some(limit) => {
                timeout(limit, self.stream.read_to_end(&mut data))
                    .await
                    .map_err(|_| TransportError::OutputTimeout(limit))??;
            }
            None => {
                self.stream.read_to_end(&mut data).await?;
            }
        }
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Stream output lines into a collector until the server closes the socket
    async fn read_lines(
        mut self,
        idle: Option<Duration>,
        collector: &mut ResultCollector,
    ) -> Result<(), TransportError> {
        let mut decoder = LineDecoder::new();
        decoder.extend(&self.buffer.split());
        let mut read_buf = vec![0u8; 4096];

        loop {
            let lines = decoder.drain_lines();
            if !lines.is_empty() {
                collector.feed(lines);
            }

            let n = match idle {
                Some(limit) => timeout(limit, self.stream.read(&mut read_buf))
                    .await
                    .map_err(|_| TransportError::OutputTimeout(limit))??,
                None => self.stream.read(&mut read_buf).await?,
            };
            if n == 0 {
                break;
            }
            decoder.extend(&read_buf[..n]);
        }

        if let Some(rest) = decoder.finish() {
            collector.feed([rest]);
        }
        collector.complete();
        Ok(())
    }
}

/// Channel to one device, reached through the ADB server
#[derive(Debug, Clone)]
pub struct AdbDeviceChannel {
    serial: String,
    config: Arc<AdbServerConfig>,
}

impl AdbDeviceChannel {
    pub fn new(serial: impl Into<String>, config: Arc<AdbServerConfig>) -> Self {
        Self {
            serial: serial.into(),
            config,
        }
    }

    async fn fetch_property(&self, key: &str) -> Result<Option<String>, TransportError> {
        if !is_safe_argument(key) {
            return Err(TransportError::UnsafeArgument(key.to_string()));
        }

        let mut conn = ServerConnection::open_transport(&self.config, &self.serial).await?;
        conn.request(&format!("shell:getprop {}", key)).await?;

        let value = conn.read_to_end(self.config.shell_timeout).await?;
        let value = value.trim();
        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }
}

#[async_trait]
impl DeviceChannel for AdbDeviceChannel {
    fn serial_number(&self) -> String {
        self.serial.clone()
    }

    fn is_emulator(&self) -> bool {
        serial::is_emulator_serial(&self.serial)
    }

    fn request_property(&self, key: &str) -> PropertyReply {
        let (mut reply_tx, reply_rx) = oneshot::channel();
        let channel = self.clone();
        let key = key.to_string();

        tokio::spawn(async move {
            // Dropping the fetch closes its socket once the caller stops waiting
            tokio::select! {
                result = channel.fetch_property(&key) => {
                    let _ = reply_tx.send(result);
                }
                _ = reply_tx.closed() => {
                    debug!("[ADB] {} getprop {} abandoned by caller", channel.serial, key);
                }
            }
        });

        reply_rx
    }

    async fn execute_shell(
        &self,
        command: &str,
        collector: &mut ResultCollector,
    ) -> Result<(), TransportError> {
        debug!("[ADB] {} shell: {}", self.serial, command);

        let mut conn = ServerConnection::open_transport(&self.config, &self.serial).await?;
        conn.request(&format!("shell:{}", command)).await?;
        conn.read_lines(self.config.shell_timeout, collector).await
    }
}

/// Host-level bridge to the ADB server
#[derive(Debug, Clone)]
pub struct AdbHostBridge {
    config: Arc<AdbServerConfig>,
}

impl AdbHostBridge {
    pub fn new(config: AdbServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Build a channel to the device with the given serial
    pub fn channel(&self, serial: impl Into<String>) -> AdbDeviceChannel {
        AdbDeviceChannel::new(serial, self.config.clone())
    }

    /// Query the server's protocol version
    pub async fn server_version(&self) -> Result<u32, TransportError> {
        let mut conn = ServerConnection::open(&self.config).await?;
        conn.request("host:version").await?;

        let text = conn.read_length_prefixed().await?;
        u32::from_str_radix(text.trim(), 16)
            .map_err(|_| TransportError::Codec(codec::CodecError::InvalidLength(text)))
    }

    async fn switch_to_tcpip(&self, serial: &str, port: u16) -> Result<String, TransportError> {
        let mut conn = ServerConnection::open_transport(&self.config, serial).await?;
        conn.request(&format!("tcpip:{}", port)).await?;
        conn.read_to_end(Some(self.config.connect_timeout)).await
    }
}

#[async_trait]
impl BridgeCoordinator for AdbHostBridge {
    async fn tcpip(&self, serial: &str, port: u16) -> bool {
        match self.switch_to_tcpip(serial, port).await {
            Ok(reply) if reply.trim_start().starts_with("restarting") => {
                info!("[ADB] {} restarting adbd on tcp:{}", serial, port);
                true
            }
            Ok(reply) => {
                warn!("[ADB] {} tcpip:{} unexpected reply: {}", serial, port, reply.trim());
                false
            }
            Err(e) => {
                error!("[ADB] {} tcpip:{} failed: {}", serial, port, e);
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "adb-server"
    }
}
