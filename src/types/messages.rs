//! Server -> client messages on the broadcast connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AggregateWindow, EdaOutput, Insight, TelemetrySample};

/// Every message carries a `type` tag so dashboards can switch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    /// Sent once, immediately after a subscriber joins.
    Connected {
        subscriber_id: String,
        server_time: DateTime<Utc>,
    },
    TelemetryUpdate {
        points: Vec<TelemetrySample>,
    },
    AggregateUpdate {
        window: AggregateWindow,
    },
    InsightUpdate {
        insight: Insight,
    },
    EdaUpdate {
        task_id: String,
        agent_id: String,
        summary: EdaOutput,
    },
}

impl BroadcastMessage {
    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::TelemetryUpdate { .. } => "telemetry_update",
            Self::AggregateUpdate { .. } => "aggregate_update",
            Self::InsightUpdate { .. } => "insight_update",
            Self::EdaUpdate { .. } => "eda_update",
        }
    }
}
