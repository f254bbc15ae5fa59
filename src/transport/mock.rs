//! Scripted in-memory channel and bridge for tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::traits::{BridgeCoordinator, DeviceChannel, PropertyReply};
use super::TransportError;
use crate::command::ResultCollector;
use crate::device::{DeviceHandle, SessionConfig};
use crate::registry::DeviceRegistry;

/// How the mock answers a property fetch
#[derive(Debug, Clone)]
pub(crate) enum MockProperty {
    Value(String),
    /// Reply with a transport failure
    Fail,
    /// Drop the reply sender without answering
    Drop,
    /// Never answer
    Hang,
}

#[derive(Debug, Clone)]
enum MockShell {
    Output(Vec<String>),
    Fail,
}

#[derive(Default)]
pub(crate) struct MockChannel {
    serial: Mutex<String>,
    emulator: bool,
    properties: Mutex<HashMap<String, MockProperty>>,
    shell: HashMap<String, MockShell>,
    /// Senders held open for `Hang` properties
    parked: Mutex<Vec<oneshot::Sender<Result<Option<String>, TransportError>>>>,
    property_requests: Mutex<Vec<String>>,
}

impl MockChannel {
    pub(crate) fn new(serial: &str) -> Self {
        Self {
            serial: Mutex::new(serial.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn emulator(mut self) -> Self {
        self.emulator = true;
        self
    }

    pub(crate) fn with_property(self, key: &str, value: &str) -> Self {
        self.set_property(key, MockProperty::Value(value.to_string()));
        self
    }

    pub(crate) fn with_property_behavior(self, key: &str, behavior: MockProperty) -> Self {
        self.set_property(key, behavior);
        self
    }

    pub(crate) fn with_shell(mut self, command: &str, lines: &[&str]) -> Self {
        let lines = lines.iter().map(|line| line.to_string()).collect();
        self.shell.insert(command.to_string(), MockShell::Output(lines));
        self
    }

    pub(crate) fn with_failing_shell(mut self, command: &str) -> Self {
        self.shell.insert(command.to_string(), MockShell::Fail);
        self
    }

    pub(crate) fn set_property(&self, key: &str, behavior: MockProperty) {
        self.properties
            .lock()
            .expect("properties lock")
            .insert(key.to_string(), behavior);
    }

    /// Change the serial, as when the bridge re-attaches the device elsewhere
    pub(crate) fn set_serial(&self, serial: &str) {
        *self.serial.lock().expect("serial lock") = serial.to_string();
    }

    pub(crate) fn property_requests(&self) -> usize {
        self.property_requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl DeviceChannel for MockChannel {
    fn serial_number(&self) -> String {
        self.serial.lock().expect("serial lock").clone()
    }

    fn is_emulator(&self) -> bool {
        self.emulator
    }

    fn request_property(&self, key: &str) -> PropertyReply {
        self.property_requests
            .lock()
            .expect("requests lock")
            .push(key.to_string());

        let (reply_tx, reply_rx) = oneshot::channel();
        let behavior = self.properties.lock().expect("properties lock").get(key).cloned();
        match behavior {
            None => {
                let _ = reply_tx.send(Ok(None));
            }
            Some(MockProperty::Value(value)) => {
                let _ = reply_tx.send(Ok(Some(value)));
            }
            Some(MockProperty::Fail) => {
                let _ = reply_tx.send(Err(TransportError::Closed));
            }
            Some(MockProperty::Drop) => drop(reply_tx),
            Some(MockProperty::Hang) => self.parked.lock().expect("parked lock").push(reply_tx),
        }
        reply_rx
    }

    async fn execute_shell(
        &self,
        command: &str,
        collector: &mut ResultCollector,
    ) -> Result<(), TransportError> {
        match self.shell.get(command) {
            Some(MockShell::Output(lines)) => {
                collector.feed(lines);
                collector.complete();
                Ok(())
            }
            Some(MockShell::Fail) | None => Err(TransportError::Refused {
                request: format!("shell:{}", command),
                message: "device offline".into(),
            }),
        }
    }
}

/// Bridge that records transport-switch requests
pub(crate) struct MockBridge {
    accept: bool,
    calls: Mutex<Vec<(String, u16)>>,
}

impl MockBridge {
    pub(crate) fn new(accept: bool) -> Self {
        Self {
            accept,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(String, u16)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl BridgeCoordinator for MockBridge {
    async fn tcpip(&self, serial: &str, port: u16) -> bool {
        self.calls
            .lock()
            .expect("calls lock")
            .push((serial.to_string(), port));
        self.accept
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Session settings with a short property timeout
pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        property_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Register `channel` with a fresh registry and open a handle on it
pub(crate) async fn open_handle(
    channel: Arc<MockChannel>,
    bridge: Arc<MockBridge>,
) -> (DeviceRegistry, DeviceHandle) {
    let registry = DeviceRegistry::new(bridge, test_config());
    let id = registry.register(channel).await;
    let handle = registry.open(id).await.expect("open handle");
    (registry, handle)
}
