//! Device sessions
//!
//! A [`DeviceHandle`] is one caller's live session on an attached device.
//! It composes raw property reads and shell commands into the high-level
//! queries (transport classification, network status) and requests
//! transport switches through the shared bridge.

mod error;
mod handle;

pub use error::PropertyError;
pub use handle::{DeviceHandle, SessionConfig};
