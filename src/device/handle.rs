//! Device handle - one live session on an attached device

use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use adb_shared::{net, props, serial, settings, TransportKind};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, warn};

use super::PropertyError;
use crate::command::{SettingsNamespace, ShellCommand};
use crate::registry::{DeviceId, RegistryLink};
use crate::transport::{BridgeCoordinator, DeviceChannel};

/// Configuration for device sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on a single property fetch
    pub property_timeout: Duration,
    /// Port used when switching a device to TCP/IP without an explicit port
    pub tcpip_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            property_timeout: Duration::from_millis(adb_shared::timeouts::PROPERTY_FAST_MS),
            tcpip_port: net::ADB_DAEMON_PORT,
        }
    }
}

/// A live session on one device
///
/// Obtained from [`DeviceRegistry::open`](crate::registry::DeviceRegistry::open)
/// and released with [`close`](DeviceHandle::close). Meant for one caller at
/// a time; every operation suspends the calling task until the device answers.
///
/// Release needs the registry lock, so it only happens in `close`. A handle
/// dropped without `close` stays counted in
/// [`DeviceRegistry::open_handles`](crate::registry::DeviceRegistry::open_handles)
/// and a warning is logged.
pub struct DeviceHandle {
    channel: Arc<dyn DeviceChannel>,
    bridge: Arc<dyn BridgeCoordinator>,
    link: RegistryLink,
    config: SessionConfig,
    closed: bool,
}

impl DeviceHandle {
    pub(crate) fn new(
        channel: Arc<dyn DeviceChannel>,
        bridge: Arc<dyn BridgeCoordinator>,
        link: RegistryLink,
        config: SessionConfig,
    ) -> Self {
        debug!(
            "[DEVICE] open(id={} at={})",
            link.device_id(),
            channel.serial_number()
        );
        Self {
            channel,
            bridge,
            link,
            config,
            closed: false,
        }
    }

    /// Release this session, notifying the registry entry
    pub async fn close(mut self) {
        debug!(
            "[DEVICE] close(id={} at={})",
            self.link.device_id(),
            self.serial_number()
        );
        self.link.release().await;
        self.closed = true;
    }

    /// Write a one-line summary at the given indent
    pub fn debug_dump(&self, indent: usize, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{:indent$}handle={}", "", self.serial_number(), indent = indent)
    }

    pub fn device_id(&self) -> DeviceId {
        self.link.device_id()
    }

    // ------------------------------------------------------------------
    // Transport classification
    // ------------------------------------------------------------------

    pub fn serial_number(&self) -> String {
        self.channel.serial_number()
    }

    pub fn is_emulator(&self) -> bool {
        self.channel.is_emulator()
    }

    /// Recomputed from the current serial on every call
    pub fn transport_kind(&self) -> TransportKind {
        TransportKind::classify(&self.serial_number(), self.is_emulator())
    }

    pub fn is_tcp_transport(&self) -> bool {
        serial::is_tcp_serial(&self.serial_number())
    }

    pub fn is_usb_transport(&self) -> bool {
        !self.is_tcp_transport() && !self.is_emulator()
    }

    /// The `ip:port` this device is attached through, for TCP/IP transports
    pub fn tcp_endpoint(&self) -> Option<SocketAddr> {
        serial::parse_tcp_endpoint(&self.serial_number())
    }

    // ------------------------------------------------------------------
    // Network status
    // ------------------------------------------------------------------

    /// Serial number the device reports over USB
    pub async fn usb_serial_number(&self) -> Result<Option<String>, PropertyError> {
        self.get_string_property(props::USB_SERIAL_NUMBER).await
    }

    /// Whether the device is connected to an infrastructure Wi-Fi network
    pub async fn is_on_infrastructure_network(&self) -> Result<bool, PropertyError> {
        let status = self.get_string_property_or(props::WLAN_STATUS, "stopped").await?;
        Ok(status == "running")
    }

    /// Address currently (or most recently) leased on the infrastructure network
    pub async fn infrastructure_address(&self) -> Result<Option<IpAddr>, PropertyError> {
        let value = self.get_string_property(props::WLAN_IP_ADDRESS).await?;
        Ok(value.and_then(|value| value.parse().ok()))
    }

    /// Whether this device owns a Wi-Fi Direct group
    ///
    /// Communication failures are logged and read as `false`.
    pub async fn is_wifi_direct_group_owner(&self) -> bool {
        let command = ShellCommand::if_config(net::WIFI_DIRECT_INTERFACE);
        match command.execute(self.channel.as_ref()).await {
            Ok(output) => output.into_interface().is_some_and(|info| {
                info.up && info.address == Some(net::WIFI_DIRECT_GROUP_OWNER_ADDRESS)
            }),
            Err(e) => {
                error!(
                    "[DEVICE] is_wifi_direct_group_owner() failed on {}; ignored: {}",
                    self.serial_number(),
                    e
                );
                false
            }
        }
    }

    /// Wi-Fi Direct device name
    ///
    /// Communication failures are logged and read as `None`.
    pub async fn wifi_direct_name(&self) -> Option<String> {
        let command =
            ShellCommand::get_setting(SettingsNamespace::Global, settings::WIFI_P2P_DEVICE_NAME);
        match command.execute(self.channel.as_ref()).await {
            Ok(output) => output.into_setting(),
            Err(e) => {
                error!(
                    "[DEVICE] wifi_direct_name() failed on {}; ignored: {}",
                    self.serial_number(),
                    e
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // TCP/IP transport switching
    // ------------------------------------------------------------------

    /// Whether adbd listens on any TCP port
    pub async fn is_listening_on_tcpip(&self) -> Result<bool, PropertyError> {
        let value = self.get_string_property(props::ADB_TCP_PORT).await?;
        Ok(value
            .and_then(|value| value.trim().parse::<u32>().ok())
            .is_some_and(|port| port != 0))
    }

    /// Whether adbd listens on exactly `port`
    pub async fn is_listening_on_tcpip_port(&self, port: u16) -> Result<bool, PropertyError> {
        let value = self.get_string_property(props::ADB_TCP_PORT).await?;
        Ok(value.as_deref() == Some(port.to_string().as_str()))
    }

    /// Ask the device to listen on the configured default port
    pub async fn listen_on_tcpip(&self) -> bool {
        self.listen_on_tcpip_port(self.config.tcpip_port).await
    }

    /// Ask the device to listen on `port`, through the shared bridge
    pub async fn listen_on_tcpip_port(&self, port: u16) -> bool {
        let serial = self.serial_number();
        debug!(
            "[DEVICE] {} requesting tcpip:{} via {}",
            serial,
            port,
            self.bridge.name()
        );
        self.bridge.tcpip(&serial, port).await
    }

    /// Wait for the device to listen on the configured default port
    pub async fn await_listening_on_tcpip(&self, wait: Duration) -> Result<bool, PropertyError> {
        self.await_listening_on_tcpip_port(self.config.tcpip_port, wait)
            .await
    }

    /// Poll until adbd listens on `port` or `wait` has passed
    ///
    /// Yields between attempts rather than sleeping.
    pub async fn await_listening_on_tcpip_port(
        &self,
        port: u16,
        wait: Duration,
    ) -> Result<bool, PropertyError> {
        let deadline = Instant::now() + wait;
        while Instant::now() <= deadline {
            if self.is_listening_on_tcpip_port(port).await? {
                return Ok(true);
            }
            tokio::task::yield_now().await;
        }
        Ok(false)
    }

    // ------------------------------------------------------------------
    // Raw properties
    // ------------------------------------------------------------------

    /// Read a system property; `Ok(None)` means the property is not set
    pub async fn get_string_property(&self, key: &str) -> Result<Option<String>, PropertyError> {
        let reply = self.channel.request_property(key);

        match timeout(self.config.property_timeout, reply).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(source))) => Err(PropertyError::Execution {
                key: key.to_string(),
                source,
            }),
            Ok(Err(source)) => Err(PropertyError::Interrupted {
                key: key.to_string(),
                source,
            }),
            Err(source) => Err(PropertyError::Timeout {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Read a system property, substituting `default` when it is not set
    pub async fn get_string_property_or(
        &self,
        key: &str,
        default: &str,
    ) -> Result<String, PropertyError> {
        Ok(self
            .get_string_property(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.link.device_id())
            .field("serial", &self.serial_number())
            .finish()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "[DEVICE] {} at {} dropped without close(); registry still counts it open",
                self.link.device_id(),
                self.serial_number()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{open_handle, MockBridge, MockChannel, MockProperty};

    async fn handle_for(channel: MockChannel) -> (Arc<MockChannel>, DeviceHandle) {
        let channel = Arc::new(channel);
        let bridge = Arc::new(MockBridge::new(true));
        let (_registry, handle) = open_handle(channel.clone(), bridge).await;
        (channel, handle)
    }

    #[tokio::test]
    async fn test_infrastructure_network_status() {
        let (_, handle) =
            handle_for(MockChannel::new("ZY3239LKJ").with_property(props::WLAN_STATUS, "running"))
                .await;
        assert!(handle.is_on_infrastructure_network().await.expect("property"));

        let (_, handle) =
            handle_for(MockChannel::new("ZY3239LKJ").with_property(props::WLAN_STATUS, "stopped"))
                .await;
        assert!(!handle.is_on_infrastructure_network().await.expect("property"));

        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ")).await;
        assert!(!handle.is_on_infrastructure_network().await.expect("property"));
    }

    #[tokio::test]
    async fn test_property_default_only_when_absent() {
        let (_, handle) =
            handle_for(MockChannel::new("ZY3239LKJ").with_property("persist.sys.tz", "UTC")).await;

        let value = handle
            .get_string_property_or("persist.sys.tz", "fallback")
            .await
            .expect("property");
        assert_eq!(value, "UTC");

        let value = handle
            .get_string_property_or("persist.sys.missing", "fallback")
            .await
            .expect("property");
        assert_eq!(value, "fallback");
    }

    #[tokio::test]
    async fn test_property_failures_are_distinct() {
        let channel = MockChannel::new("ZY3239LKJ")
            .with_property_behavior("k.fail", MockProperty::Fail)
            .with_property_behavior("k.drop", MockProperty::Drop)
            .with_property_behavior("k.hang", MockProperty::Hang);
        let (_, handle) = handle_for(channel).await;

        let err = handle.get_string_property("k.fail").await.expect_err("should fail");
        assert!(matches!(err, PropertyError::Execution { .. }));

        let err = handle.get_string_property("k.drop").await.expect_err("should fail");
        assert!(matches!(err, PropertyError::Interrupted { .. }));

        let err = handle.get_string_property("k.hang").await.expect_err("should fail");
        assert!(matches!(err, PropertyError::Timeout { .. }));
        assert_eq!(err.key(), "k.hang");

        // Failures surface through the defaulting overload too
        let err = handle
            .get_string_property_or("k.fail", "fallback")
            .await
            .expect_err("should fail");
        assert!(matches!(err, PropertyError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_transport_classification() {
        let (_, handle) = handle_for(MockChannel::new("192.168.1.5:5555")).await;
        assert!(handle.is_tcp_transport());
        assert!(!handle.is_usb_transport());
        assert_eq!(handle.transport_kind(), TransportKind::Tcpip);
        assert_eq!(
            handle.tcp_endpoint(),
            Some("192.168.1.5:5555".parse::<SocketAddr>().expect("addr"))
        );

        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ")).await;
        assert!(!handle.is_tcp_transport());
        assert!(handle.is_usb_transport());
        assert!(handle.tcp_endpoint().is_none());

        let (_, handle) = handle_for(MockChannel::new("emulator-5554").emulator()).await;
        assert!(handle.is_emulator());
        assert!(!handle.is_usb_transport());
        assert_eq!(handle.transport_kind(), TransportKind::Emulator);
    }

    #[tokio::test]
    async fn test_transport_kind_follows_serial() {
        let (channel, handle) = handle_for(MockChannel::new("ZY3239LKJ")).await;
        assert_eq!(handle.transport_kind(), TransportKind::Usb);

        channel.set_serial("192.168.49.1:5555");
        assert_eq!(handle.transport_kind(), TransportKind::Tcpip);
    }

    #[tokio::test]
    async fn test_infrastructure_address() {
        let (_, handle) = handle_for(
            MockChannel::new("ZY3239LKJ").with_property(props::WLAN_IP_ADDRESS, "192.168.0.20"),
        )
        .await;
        assert_eq!(
            handle.infrastructure_address().await.expect("property"),
            Some("192.168.0.20".parse::<IpAddr>().expect("addr"))
        );

        let (_, handle) = handle_for(
            MockChannel::new("ZY3239LKJ").with_property(props::WLAN_IP_ADDRESS, "not-an-address"),
        )
        .await;
        assert!(handle.infrastructure_address().await.expect("property").is_none());

        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ")).await;
        assert!(handle.infrastructure_address().await.expect("property").is_none());
    }

    #[tokio::test]
    async fn test_wifi_direct_group_owner() {
        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ").with_shell(
            "ifconfig p2p0",
            &["p2p0: ip 192.168.49.1 mask 255.255.255.0 flags [up broadcast running multicast]"],
        ))
        .await;
        assert!(handle.is_wifi_direct_group_owner().await);

        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ").with_shell(
            "ifconfig p2p0",
            &["p2p0: ip 192.168.49.1 mask 255.255.255.0 flags [down]"],
        ))
        .await;
        assert!(!handle.is_wifi_direct_group_owner().await);

        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ").with_shell(
            "ifconfig p2p0",
            &["p2p0: ip 192.168.49.23 mask 255.255.255.0 flags [up broadcast]"],
        ))
        .await;
        assert!(!handle.is_wifi_direct_group_owner().await);
    }

    #[tokio::test]
    async fn test_group_owner_check_swallows_communication_failure() {
        let (_, handle) =
            handle_for(MockChannel::new("ZY3239LKJ").with_failing_shell("ifconfig p2p0")).await;
        assert!(!handle.is_wifi_direct_group_owner().await);
    }

    #[tokio::test]
    async fn test_wifi_direct_name() {
        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ").with_shell(
            "settings get global wifi_p2p_device_name",
            &["DIRECT-xy-Robot"],
        ))
        .await;
        assert_eq!(handle.wifi_direct_name().await.as_deref(), Some("DIRECT-xy-Robot"));

        let (_, handle) = handle_for(
            MockChannel::new("ZY3239LKJ")
                .with_failing_shell("settings get global wifi_p2p_device_name"),
        )
        .await;
        assert!(handle.wifi_direct_name().await.is_none());
    }

    #[tokio::test]
    async fn test_listening_on_tcpip() {
        let (channel, handle) = handle_for(MockChannel::new("ZY3239LKJ")).await;
        assert!(!handle.is_listening_on_tcpip().await.expect("property"));

        channel.set_property(props::ADB_TCP_PORT, MockProperty::Value("0".into()));
        assert!(!handle.is_listening_on_tcpip().await.expect("property"));
        assert!(!handle.is_listening_on_tcpip_port(5555).await.expect("property"));

        channel.set_property(props::ADB_TCP_PORT, MockProperty::Value("5555".into()));
        assert!(handle.is_listening_on_tcpip().await.expect("property"));
        assert!(handle.is_listening_on_tcpip_port(5555).await.expect("property"));
        assert!(!handle.is_listening_on_tcpip_port(5556).await.expect("property"));
    }

    #[tokio::test]
    async fn test_listen_on_tcpip_uses_bridge() {
        let bridge = Arc::new(MockBridge::new(true));
        let (_registry, handle) =
            open_handle(Arc::new(MockChannel::new("ZY3239LKJ")), bridge.clone()).await;

        assert!(handle.listen_on_tcpip().await);
        assert!(handle.listen_on_tcpip_port(5556).await);
        assert_eq!(
            bridge.calls(),
            vec![("ZY3239LKJ".to_string(), 5555), ("ZY3239LKJ".to_string(), 5556)]
        );

        let (_registry, handle) = open_handle(
            Arc::new(MockChannel::new("ZY3239LKJ")),
            Arc::new(MockBridge::new(false)),
        )
        .await;
        assert!(!handle.listen_on_tcpip().await);
    }

    #[tokio::test]
    async fn test_await_listening_returns_immediately_when_ready() {
        let (channel, handle) = handle_for(
            MockChannel::new("ZY3239LKJ").with_property(props::ADB_TCP_PORT, "5555"),
        )
        .await;

        let started = Instant::now();
        let listening = handle
            .await_listening_on_tcpip_port(5555, Duration::from_secs(5))
            .await
            .expect("property");
        assert!(listening);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(channel.property_requests(), 1);
    }

    #[tokio::test]
    async fn test_await_listening_times_out() {
        let (channel, handle) =
            handle_for(MockChannel::new("ZY3239LKJ").with_property(props::ADB_TCP_PORT, "0")).await;

        let started = Instant::now();
        let listening = handle
            .await_listening_on_tcpip(Duration::from_millis(100))
            .await
            .expect("property");
        assert!(!listening);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(channel.property_requests() > 1);
    }

    #[tokio::test]
    async fn test_debug_dump() {
        let (_, handle) = handle_for(MockChannel::new("ZY3239LKJ")).await;
        let mut out = Vec::new();
        handle.debug_dump(4, &mut out).expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "    handle=ZY3239LKJ\n");
    }
}
