//! Device channel backends
//!
//! This module handles:
//! - The narrow interfaces the session layer consumes (`DeviceChannel`,
//!   `BridgeCoordinator`)
//! - A backend speaking the host protocol to a running ADB server

pub mod adb;
mod error;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use adb::{AdbDeviceChannel, AdbHostBridge, AdbServerConfig};
pub use error::TransportError;
pub use traits::{BridgeCoordinator, DeviceChannel, PropertyReply};
