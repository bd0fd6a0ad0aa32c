//! Per-server connection state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state machine states.
///
/// Transitions:
/// - `Disconnected -> Connecting` on connection creation
/// - `Connecting -> Connected` (handshake ok) `| Error` (handshake failed)
/// - `Connected -> Disconnected` (graceful close) `| Error` (transport or health failure)
/// - `Error -> Reconnecting` (attempts remain)
/// - `Reconnecting -> Connected | Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
}

impl ServerStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, ServerStatus::Connected)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::Disconnected => "disconnected",
            ServerStatus::Connecting => "connecting",
            ServerStatus::Connected => "connected",
            ServerStatus::Error => "error",
            ServerStatus::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Point-in-time snapshot of a pooled server, safe to hand to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub status: ServerStatus,
    pub enabled: bool,
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    pub health_checks: u64,
}
