//! ADB Shared Protocol Types
//!
//! This crate provides the wire constants, host-protocol codec, serial
//! number grammar and shell argument rules shared by the device session
//! layer and its transports.

pub mod codec;
pub mod serial;
pub mod shell;

pub use serial::{parse_tcp_endpoint, TransportKind};
pub use shell::is_safe_argument;

/// Well-known system property keys read from devices
pub mod props {
    /// Serial number the device reports over USB
    pub const USB_SERIAL_NUMBER: &str = "ro.serialno";

    /// Address leased to the infrastructure wlan interface
    pub const WLAN_IP_ADDRESS: &str = "dhcp.wlan0.ipaddress";

    /// State of the wlan DHCP client service (`running` / `stopped`)
    pub const WLAN_STATUS: &str = "init.svc.dhcpcd_wlan0";

    /// Port adbd listens on for TCP/IP connections, `0` or absent when USB only
    pub const ADB_TCP_PORT: &str = "service.adb.tcp.port";
}

/// Well-known `settings` keys
pub mod settings {
    /// Wi-Fi Direct device name (GLOBAL namespace)
    pub const WIFI_P2P_DEVICE_NAME: &str = "wifi_p2p_device_name";
}

/// Network constants for Wi-Fi Direct and TCP/IP transport switching
pub mod net {
    use std::net::Ipv4Addr;

    /// Peer-to-peer interface name
    pub const WIFI_DIRECT_INTERFACE: &str = "p2p0";

    /// Address a Wi-Fi Direct group owner always assigns itself
    pub const WIFI_DIRECT_GROUP_OWNER_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 49, 1);

    /// Default port adbd is asked to listen on when switched to TCP/IP
    pub const ADB_DAEMON_PORT: u16 = 5555;

    /// Default port of the host-side ADB server
    pub const ADB_SERVER_PORT: u16 = 5037;

    /// Environment variable overriding the ADB server port
    pub const ADB_SERVER_PORT_ENV: &str = "ANDROID_ADB_SERVER_PORT";
}

/// Timing parameters
pub mod timeouts {
    /// Bound on a single property fetch, in milliseconds
    pub const PROPERTY_FAST_MS: u64 = 1000;

    /// Connect timeout towards the ADB server, in milliseconds
    pub const SERVER_CONNECT_MS: u64 = 5000;
}
