//! Event variants pushed through the hub event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pool::ServerStatus;

/// Discriminant used for subscriber filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ServerStatus,
    ToolExecution,
    SystemAlert,
    Activity,
    HealthCheck,
    Ping,
}

impl EventType {
    /// Parse a comma-separated filter list; unknown names are ignored.
    pub fn parse_filter(raw: &str) -> std::collections::HashSet<EventType> {
        raw.split(',')
            .filter_map(|part| {
                serde_json::from_value(serde_json::Value::String(part.trim().to_string())).ok()
            })
            .collect()
    }
}

/// Typed event payload, tagged for the wire as `{type, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    ServerStatus {
        server: String,
        status: ServerStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    ToolExecution {
        tool: String,
        server: String,
        group: String,
        success: bool,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SystemAlert {
        level: String,
        message: String,
    },
    Activity {
        message: String,
    },
    HealthCheck {
        status: String,
        connected_servers: usize,
        total_servers: usize,
    },
    Ping,
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::ServerStatus { .. } => EventType::ServerStatus,
            EventPayload::ToolExecution { .. } => EventType::ToolExecution,
            EventPayload::SystemAlert { .. } => EventType::SystemAlert,
            EventPayload::Activity { .. } => EventType::Activity,
            EventPayload::HealthCheck { .. } => EventType::HealthCheck,
            EventPayload::Ping => EventType::Ping,
        }
    }
}

/// A published event: payload plus ISO-8601 timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl HubEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}
