//! Device registry
//!
//! This module handles:
//! - Tracking devices attached by serial number
//! - Opening session handles on registered devices
//! - Receiving close notifications from handles, keyed by device id

mod manager;

pub use manager::{DeviceId, DeviceRegistry, RegistryLink};
