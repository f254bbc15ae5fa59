//! Registry of attached devices and their open sessions

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Result};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::device::{DeviceHandle, SessionConfig};
use crate::transport::{BridgeCoordinator, DeviceChannel};

/// Identifier the registry assigns to each attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dev-{}", self.0)
    }
}

struct DeviceEntry {
    channel: Arc<dyn DeviceChannel>,
    open_handles: usize,
}

type DeviceTable = RwLock<HashMap<DeviceId, DeviceEntry>>;

/// Non-owning link from a handle back to its registry entry
///
/// Holds only the device id and a weak reference to the table, so a handle
/// never keeps the registry alive.
pub struct RegistryLink {
    device_id: DeviceId,
    devices: Weak<DeviceTable>,
}

impl RegistryLink {
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Tell the registry one session on this device has been released
    pub(crate) async fn release(&self) {
        let Some(devices) = self.devices.upgrade() else {
            debug!("[REGISTRY] {} released after registry shutdown", self.device_id);
            return;
        };

        let mut devices = devices.write().await;
        match devices.get_mut(&self.device_id) {
            Some(entry) => {
                entry.open_handles = entry.open_handles.saturating_sub(1);
                debug!(
                    "[REGISTRY] {} released ({} still open)",
                    self.device_id, entry.open_handles
                );
            }
            None => warn!("[REGISTRY] {} released but no longer registered", self.device_id),
        }
    }
}

/// Tracks attached devices and hands out sessions on them
pub struct DeviceRegistry {
    /// Map of device_id -> entry
    devices: Arc<DeviceTable>,
    next_id: AtomicU64,
    bridge: Arc<dyn BridgeCoordinator>,
    config: SessionConfig,
}

impl DeviceRegistry {
    /// Create a new registry sharing `bridge` across all devices
    pub fn new(bridge: Arc<dyn BridgeCoordinator>, config: SessionConfig) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            bridge,
            config,
        }
    }

    /// Register a device reachable over `channel`
    pub async fn register(&self, channel: Arc<dyn DeviceChannel>) -> DeviceId {
        let device_id = DeviceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        info!("[REGISTRY] {} attached at {}", device_id, channel.serial_number());

        let entry = DeviceEntry {
            channel,
            open_handles: 0,
        };
        self.devices.write().await.insert(device_id, entry);
        device_id
    }

    /// Unregister a device; open handles keep working but their close is ignored
    pub async fn unregister(&self, device_id: DeviceId) -> bool {
        let removed = self.devices.write().await.remove(&device_id);
        if let Some(entry) = &removed {
            info!(
                "[REGISTRY] {} detached ({} handles open)",
                device_id, entry.open_handles
            );
        }
        removed.is_some()
    }

    /// Open a new session on a registered device
    pub async fn open(&self, device_id: DeviceId) -> Result<DeviceHandle> {
        let mut devices = self.devices.write().await;
        let entry = devices
            .get_mut(&device_id)
            .ok_or_else(|| anyhow!("Device not registered: {}", device_id))?;
        entry.open_handles += 1;

        let link = RegistryLink {
            device_id,
            devices: Arc::downgrade(&self.devices),
        };
        Ok(DeviceHandle::new(
            entry.channel.clone(),
            self.bridge.clone(),
            link,
            self.config.clone(),
        ))
    }

    /// Find the device currently known by `serial`
    pub async fn find_by_serial(&self, serial: &str) -> Option<DeviceId> {
        let devices = self.devices.read().await;
        devices
            .iter()
            .find(|(_, entry)| entry.channel.serial_number() == serial)
            .map(|(id, _)| *id)
    }

    /// Number of sessions currently open on a device
    pub async fn open_handles(&self, device_id: DeviceId) -> Option<usize> {
        let devices = self.devices.read().await;
        devices.get(&device_id).map(|entry| entry.open_handles)
    }

    /// Get list of all registered device ids
    pub async fn devices(&self) -> Vec<DeviceId> {
        let devices = self.devices.read().await;
        let mut ids: Vec<DeviceId> = devices.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Get the number of registered devices
    pub async fn count(&self) -> usize {
        self.devices.read().await.len()
    }
}
