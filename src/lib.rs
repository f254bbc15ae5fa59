//! ADB device sessions
//!
//! Live sessions on devices reachable through an ADB server: reading
//! system properties, running shell commands and parsing their output,
//! and switching a device between USB and TCP/IP transports.

pub mod command;
pub mod device;
pub mod registry;
pub mod transport;

pub use adb_shared::TransportKind;
pub use command::{CommandError, CommandOutput, InterfaceInfo, ResultCollector, ShellCommand};
pub use device::{DeviceHandle, PropertyError, SessionConfig};
pub use registry::{DeviceId, DeviceRegistry};
pub use transport::{AdbHostBridge, AdbServerConfig, BridgeCoordinator, DeviceChannel};
