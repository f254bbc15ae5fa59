use std::sync::Arc;
use std::time::Duration;

use adb_session::{AdbHostBridge, AdbServerConfig, DeviceHandle, DeviceRegistry, SessionConfig};
use adb_shared::{net, timeouts};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "adb-session", about = "Inspect ADB devices and switch them to TCP/IP")]
struct Cli {
    /// ADB server address (default: 127.0.0.1 on $ANDROID_ADB_SERVER_PORT or 5037)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Bound on each property fetch, in milliseconds
    #[arg(long, global = true, default_value_t = timeouts::PROPERTY_FAST_MS)]
    property_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report transport and network status of devices
    Status {
        #[arg(required = true)]
        serials: Vec<String>,
    },
    /// Switch a device's daemon to TCP/IP and wait until it listens
    Tcpip {
        serial: String,
        #[arg(long, default_value_t = net::ADB_DAEMON_PORT)]
        port: u16,
        /// How long to wait for the daemon to come back, in milliseconds
        #[arg(long, default_value_t = 5000)]
        wait_ms: u64,
    },
    /// Print the ADB server protocol version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let mut server_config = AdbServerConfig::from_env();
    if let Some(address) = cli.server.clone() {
        server_config.address = address;
    }
    let session_config = SessionConfig {
        property_timeout: Duration::from_millis(cli.property_timeout_ms),
        ..Default::default()
    };

    info!("ADB server: {}", server_config.address);
    let bridge = Arc::new(AdbHostBridge::new(server_config));
    let registry = DeviceRegistry::new(bridge.clone(), session_config);

    match cli.command {
        Command::Status { serials } => run_status(&registry, &bridge, serials).await,
        Command::Tcpip {
            serial,
            port,
            wait_ms,
        } => run_tcpip(&registry, &bridge, serial, port, Duration::from_millis(wait_ms)).await,
        Command::Version => {
            let version = bridge
                .server_version()
                .await
                .context("Failed to query ADB server version")?;
            println!("{}", version);
            Ok(())
        }
    }
}

/// Attach to a device by serial and open a session on it
async fn attach(
    registry: &DeviceRegistry,
    bridge: &AdbHostBridge,
    serial: &str,
) -> Result<DeviceHandle> {
    let device_id = match registry.find_by_serial(serial).await {
        Some(id) => id,
        None => registry.register(Arc::new(bridge.channel(serial))).await,
    };
    registry.open(device_id).await
}

async fn run_status(
    registry: &DeviceRegistry,
    bridge: &AdbHostBridge,
    serials: Vec<String>,
) -> Result<()> {
    let mut handles = Vec::with_capacity(serials.len());
    for serial in &serials {
        handles.push(attach(registry, bridge, serial).await?);
    }

    let reports = join_all(handles.iter().map(describe)).await;

    let mut failures = 0;
    for (handle, report) in handles.iter().zip(reports) {
        match report {
            Ok(lines) => {
                println!("{}", handle.serial_number());
                for line in lines {
                    println!("  {}", line);
                }
            }
            Err(e) => {
                error!("{}: {:#}", handle.serial_number(), e);
                failures += 1;
            }
        }
    }

    for handle in handles {
        handle.close().await;
    }

    if failures > 0 {
        bail!("{} of {} devices could not be queried", failures, serials.len());
    }
    Ok(())
}

/// Collect a status report for one device
async fn describe(handle: &DeviceHandle) -> Result<Vec<String>> {
    let mut lines = vec![format!("transport: {}", handle.transport_kind())];

    if let Some(endpoint) = handle.tcp_endpoint() {
        lines.push(format!("endpoint: {}", endpoint));
    }
    if let Some(usb_serial) = handle.usb_serial_number().await? {
        lines.push(format!("usb serial: {}", usb_serial));
    }

    let on_wlan = handle.is_on_infrastructure_network().await?;
    lines.push(format!("wlan: {}", if on_wlan { "running" } else { "stopped" }));
    if let Some(address) = handle.infrastructure_address().await? {
        lines.push(format!("wlan address: {}", address));
    }

    lines.push(format!(
        "wifi direct group owner: {}",
        handle.is_wifi_direct_group_owner().await
    ));
    if let Some(name) = handle.wifi_direct_name().await {
        lines.push(format!("wifi direct name: {}", name));
    }

    lines.push(format!(
        "listening on tcpip: {}",
        handle.is_listening_on_tcpip().await?
    ));
    Ok(lines)
}

async fn run_tcpip(
    registry: &DeviceRegistry,
    bridge: &AdbHostBridge,
    serial: String,
    port: u16,
    wait: Duration,
) -> Result<()> {
    let handle = attach(registry, bridge, &serial).await?;
    let result = switch_to_tcpip(&handle, port, wait).await;
    handle.close().await;
    result
}

async fn switch_to_tcpip(handle: &DeviceHandle, port: u16, wait: Duration) -> Result<()> {
    let serial = handle.serial_number();

    if handle.is_listening_on_tcpip_port(port).await? {
        println!("{} already listening on tcp:{}", serial, port);
        return Ok(());
    }
    if !handle.is_usb_transport() {
        warn!("{} is attached over {}, not USB", serial, handle.transport_kind());
    }

    if !handle.listen_on_tcpip_port(port).await {
        bail!("ADB server refused to switch {} to tcp:{}", serial, port);
    }

    if handle.await_listening_on_tcpip_port(port, wait).await? {
        println!("{} listening on tcp:{}", serial, port);
        Ok(())
    } else {
        bail!("{} did not start listening on tcp:{} within {:?}", serial, port, wait)
    }
}
