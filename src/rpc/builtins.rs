//! Built-in host methods.
//!
//! | Method | Kind | Result |
//! |--------|------|--------|
//! | `host/version` | request | crate name, crate version, protocol version |
//! | `host/systemInfo` | request | OS, architecture, family |
//! | `host/log` | notification | forwarded to `tracing` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::document::handshake::PROTOCOL_VERSION;
use crate::error::Result;

use super::bridge::Bridge;

// ============================================================================
// Constants
// ============================================================================

/// Method returning [`VersionInfo`].
pub const METHOD_VERSION: &str = "host/version";

/// Method returning [`SystemInfo`].
pub const METHOD_SYSTEM_INFO: &str = "host/systemInfo";

/// Notification carrying a [`LogLine`].
pub const METHOD_LOG: &str = "host/log";

/// Tracing target for log lines forwarded from the remote.
const REMOTE_LOG_TARGET: &str = "panel_bridge::remote";

// ============================================================================
// Types
// ============================================================================

/// Result of `host/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Crate name.
    pub name: String,
    /// Crate version.
    pub version: String,
    /// Wire protocol version.
    pub protocol_version: u32,
}

impl VersionInfo {
    /// Returns the version of this build.
    #[must_use]
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Result of `host/systemInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// CPU architecture, e.g. `x86_64`.
    pub arch: String,
    /// OS family, e.g. `unix`.
    pub family: String,
}

impl SystemInfo {
    /// Returns information about the running host.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            family: std::env::consts::FAMILY.to_string(),
        }
    }
}

/// Params of `host/log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// `error`, `warn`, `info`, `debug` or `trace`; anything else logs at info.
    #[serde(default)]
    pub level: String,
    /// Log message.
    pub message: String,
}

// ============================================================================
// Installation
// ============================================================================

/// Registers the built-in methods on `bridge`.
///
/// # Errors
///
/// Returns [`Error::DuplicateHandler`](crate::Error::DuplicateHandler) if a
/// built-in method is already registered, or
/// [`Error::Config`](crate::Error::Config) after initialization.
pub fn install(bridge: &Bridge) -> Result<()> {
    bridge.register_handler(METHOD_VERSION, |(): ()| async move { Ok(VersionInfo::current()) })?;
    bridge.register_handler(METHOD_SYSTEM_INFO, |(): ()| async move { Ok(SystemInfo::current()) })?;
    bridge.register_listener(METHOD_LOG, forward_log)?;
    Ok(())
}

fn forward_log(line: LogLine) {
    let message = line.message.as_str();
    match line.level.to_ascii_lowercase().as_str() {
        "error" => error!(target: REMOTE_LOG_TARGET, "{message}"),
        "warn" | "warning" => warn!(target: REMOTE_LOG_TARGET, "{message}"),
        "debug" => debug!(target: REMOTE_LOG_TARGET, "{message}"),
        "trace" => trace!(target: REMOTE_LOG_TARGET, "{message}"),
        _ => info!(target: REMOTE_LOG_TARGET, "{message}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::rpc::BridgeOptions;
    use crate::transport::ChannelTransport;

    #[test]
    fn test_version_info_serializes_camel_case() {
        let value = serde_json::to_value(VersionInfo::current()).expect("serialize");
        assert_eq!(value["name"], json!("panel-bridge"));
        assert_eq!(value["protocolVersion"], json!(PROTOCOL_VERSION));
    }

    #[test]
    fn test_log_line_level_defaults_to_empty() {
        let line: LogLine = serde_json::from_value(json!({"message": "hi"})).expect("decode");
        assert_eq!(line.level, "");
        forward_log(line);
    }

    #[tokio::test]
    async fn test_builtins_answer_over_bridge() {
        let (a, b) = ChannelTransport::pair();
        let host = Bridge::new(a, BridgeOptions::default()).expect("host");
        let panel = Bridge::new(b, BridgeOptions::default()).expect("panel");

        install(&host).expect("install");
        host.initialize().expect("init host");
        panel.initialize().expect("init panel");

        let version: VersionInfo = panel.call(METHOD_VERSION, ()).await.expect("version");
        assert_eq!(version, VersionInfo::current());

        let system: SystemInfo = panel.call(METHOD_SYSTEM_INFO, ()).await.expect("system");
        assert_eq!(system.os, std::env::consts::OS);

        panel
            .notify(METHOD_LOG, LogLine { level: "warn".into(), message: "from panel".into() })
            .expect("log");
    }

    #[test]
    fn test_install_twice_is_rejected() {
        let (a, _b) = ChannelTransport::pair();
        let host = Bridge::new(a, BridgeOptions::default()).expect("host");

        install(&host).expect("first");
        assert!(install(&host).is_err());
    }
}
