//! Channel trait abstraction for pluggable device backends

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::TransportError;
use crate::command::ResultCollector;

/// Pending answer to a property fetch
///
/// Resolves to `Ok(None)` when the property is not set on the device. The
/// sender side is dropped without answering if the fetch is abandoned.
pub type PropertyReply = oneshot::Receiver<Result<Option<String>, TransportError>>;

/// Per-device connection used for property reads and shell commands
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Serial the bridge currently knows this device by
    fn serial_number(&self) -> String;

    /// Whether the device is an emulator instance
    fn is_emulator(&self) -> bool;

    /// Start fetching a system property
    fn request_property(&self, key: &str) -> PropertyReply;

    /// Run a shell command, feeding its output into `collector`
    ///
    /// Implementations call `collector.complete()` once the output stream
    /// has ended, before returning `Ok`.
    async fn execute_shell(
        &self,
        command: &str,
        collector: &mut ResultCollector,
    ) -> Result<(), TransportError>;
}

/// Host-level channel shared by all devices for transport switches
#[async_trait]
pub trait BridgeCoordinator: Send + Sync {
    /// Ask the device's daemon to restart listening on TCP `port`
    async fn tcpip(&self, serial: &str, port: u16) -> bool;

    /// Human-readable name for this bridge
    fn name(&self) -> &'static str;
}
