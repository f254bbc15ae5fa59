//! Shell command family - request formatting and response parsing

use std::net::Ipv4Addr;

use adb_shared::is_safe_argument;
use thiserror::Error;
use tracing::debug;

use super::ResultCollector;
use crate::transport::{DeviceChannel, TransportError};

/// Errors raised while executing a shell command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to communicate with device running {request:?}: {source}")]
    Communication {
        request: String,
        #[source]
        source: TransportError,
    },

    #[error("Refusing to pass {0:?} to the device shell")]
    UnsafeArgument(String),
}

/// Namespace of the Android `settings` provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsNamespace {
    System,
    Secure,
    Global,
}

// Rendered lowercase, the form `settings help` documents, rather than the
// upper-case variant names other ADB clients send.
impl std::fmt::Display for SettingsNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsNamespace::System => write!(f, "system"),
            SettingsNamespace::Secure => write!(f, "secure"),
            SettingsNamespace::Global => write!(f, "global"),
        }
    }
}

/// State of one network interface, as reported by `ifconfig`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: Option<Ipv4Addr>,
    pub up: bool,
}

impl InterfaceInfo {
    /// Parse `ifconfig` output
    ///
    /// Handles both the toolbox form
    /// (`p2p0: ip 192.168.49.1 mask 255.255.255.0 flags [up broadcast]`)
    /// and the net-tools form (`inet addr:192.168.49.1 ... UP BROADCAST`).
    /// The address is the first token that parses as IPv4.
    pub fn parse(name: impl Into<String>, output: &str) -> Self {
        let tokens = || {
            output
                .split(|c: char| {
                    c.is_whitespace() || matches!(c, ':' | '[' | ']' | ',' | '<' | '>' | '=')
                })
                .filter(|token| !token.is_empty())
        };

        Self {
            name: name.into(),
            address: tokens().find_map(|token| token.parse::<Ipv4Addr>().ok()),
            up: tokens().any(|token| token.eq_ignore_ascii_case("up")),
        }
    }
}

/// The supported command variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// `settings get <namespace> <key>`
    GetSetting {
        namespace: SettingsNamespace,
        key: String,
    },
    /// `ifconfig <interface>`
    IfConfig { interface: String },
}

impl CommandKind {
    fn format_request(&self) -> String {
        match self {
            CommandKind::GetSetting { namespace, key } => {
                format!("settings get {} {}", namespace, key)
            }
            CommandKind::IfConfig { interface } => format!("ifconfig {}", interface),
        }
    }

    /// The caller-supplied word spliced into the command line
    fn argument(&self) -> &str {
        match self {
            CommandKind::GetSetting { key, .. } => key,
            CommandKind::IfConfig { interface } => interface,
        }
    }

    fn parse(&self, text: &str) -> CommandOutput {
        match self {
            CommandKind::GetSetting { .. } => {
                let value = text.trim();
                CommandOutput::Setting((!value.is_empty()).then(|| value.to_string()))
            }
            CommandKind::IfConfig { interface } => {
                CommandOutput::Interface(InterfaceInfo::parse(interface.as_str(), text))
            }
        }
    }
}

/// Typed result of a successfully executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Setting value, absent when nothing was printed
    Setting(Option<String>),
    /// Interface state
    Interface(InterfaceInfo),
}

impl CommandOutput {
    /// The setting value, if this is a `GetSetting` result
    pub fn into_setting(self) -> Option<String> {
        match self {
            CommandOutput::Setting(value) => value,
            CommandOutput::Interface(_) => None,
        }
    }

    /// The interface state, if this is an `IfConfig` result
    pub fn into_interface(self) -> Option<InterfaceInfo> {
        match self {
            CommandOutput::Interface(info) => Some(info),
            CommandOutput::Setting(_) => None,
        }
    }
}

/// A single remote shell invocation
///
/// Built once per call and consumed by [`execute`](ShellCommand::execute).
#[derive(Debug)]
pub struct ShellCommand {
    kind: CommandKind,
    request: String,
    collector: ResultCollector,
}

impl ShellCommand {
    pub fn new(kind: CommandKind) -> Self {
        let request = kind.format_request();
        Self {
            kind,
            request,
            collector: ResultCollector::new(),
        }
    }

    /// Read a value from the `settings` provider
    pub fn get_setting(namespace: SettingsNamespace, key: impl Into<String>) -> Self {
        Self::new(CommandKind::GetSetting {
            namespace,
            key: key.into(),
        })
    }

    /// Query the state of a network interface
    pub fn if_config(interface: impl Into<String>) -> Self {
        Self::new(CommandKind::IfConfig {
            interface: interface.into(),
        })
    }

    /// The request line sent to the device shell
    pub fn request(&self) -> &str {
        &self.request
    }

    /// Run the command on `channel` and parse its output
    ///
    /// Only transport failures are errors. Output that is empty or does not
    /// parse still succeeds, with an absent typed result.
    pub async fn execute(
        mut self,
        channel: &dyn DeviceChannel,
    ) -> Result<CommandOutput, CommandError> {
        if !is_safe_argument(self.kind.argument()) {
            return Err(CommandError::UnsafeArgument(self.kind.argument().to_string()));
        }
        debug!("[CMD] {} <- {}", channel.serial_number(), self.request);

        if let Err(source) = channel.execute_shell(&self.request, &mut self.collector).await {
            return Err(CommandError::Communication {
                request: self.request,
                source,
            });
        }

        Ok(self.kind.parse(self.collector.result().unwrap_or_default()))
    }
}
