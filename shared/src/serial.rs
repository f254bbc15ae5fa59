//! Serial Number Grammar
//!
//! ADB identifies every device by a serial string. Devices attached over
//! TCP/IP carry their `ip:port` endpoint as serial, emulators carry an
//! `emulator-<port>` serial, anything else is a USB serial.

use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;

use regex::Regex;

/// Prefix of serials the ADB server assigns to emulator instances
pub const EMULATOR_SERIAL_PREFIX: &str = "emulator-";

/// Four 1-3 digit decimal groups, a colon, and a 1-5 digit port
static TCP_SERIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}):([0-9]{1,5})$")
        .expect("tcp serial pattern")
});

/// How a device is connected to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Usb,
    Tcpip,
    Emulator,
}

impl TransportKind {
    /// Classify a device from its serial and emulator flag
    pub fn classify(serial: &str, is_emulator: bool) -> Self {
        if is_emulator {
            TransportKind::Emulator
        } else if is_tcp_serial(serial) {
            TransportKind::Tcpip
        } else {
            TransportKind::Usb
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Usb => write!(f, "USB"),
            TransportKind::Tcpip => write!(f, "TCPIP"),
            TransportKind::Emulator => write!(f, "EMULATOR"),
        }
    }
}

/// Whether a serial has the `a.b.c.d:port` shape of a TCP/IP device
pub fn is_tcp_serial(serial: &str) -> bool {
    TCP_SERIAL.is_match(serial)
}

/// Whether a serial names an emulator instance
pub fn is_emulator_serial(serial: &str) -> bool {
    serial.starts_with(EMULATOR_SERIAL_PREFIX)
}

/// Parse the endpoint out of a TCP/IP serial
///
/// Returns `None` when the serial is not TCP-shaped or its groups are out
/// of range (e.g. `300.1.1.1:5555` or port `99999`).
pub fn parse_tcp_endpoint(serial: &str) -> Option<SocketAddr> {
    let caps = TCP_SERIAL.captures(serial)?;
    let host: IpAddr = caps.get(1)?.as_str().parse().ok()?;
    let port: u16 = caps.get(2)?.as_str().parse().ok()?;
    Some(SocketAddr::new(host, port))
}
