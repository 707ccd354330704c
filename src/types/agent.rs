//! Agent registrations, task and result envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Severity, TelemetrySample};

// ─── Task types ───────────────────────────────────────────────────────────────

/// Recognised task type strings. Stored as plain strings on the wire so new
/// agent kinds do not need a relay release.
pub mod task_type {
    pub const EDA: &str = "eda";
    pub const EXPLAINER: &str = "explainer";
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// Registration call body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub agent_id: String,
    pub task_types: Vec<String>,
    /// Track names or `["*"]`.
    pub tracks: Vec<String>,
    pub capacity: u32,
}

/// A live agent as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub agent_id: String,
    pub capabilities: BTreeSet<String>,
    /// Canonical track keys, or the wildcard.
    pub tracks: BTreeSet<String>,
    pub capacity: u32,
    pub load: u32,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

// ─── Tasks ────────────────────────────────────────────────────────────────────

/// Unit of work written to the dispatch log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: String,
    pub task_type: String,
    pub track: String,
    pub chassis: String,
    /// Lower is more urgent.
    pub priority: u8,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Delivery attempt, stamped from the log's delivery count on receipt.
    #[serde(default)]
    pub attempt: u32,
    pub max_attempts: u32,
}

impl AgentTask {
    pub fn new(
        task_type: &str,
        track: &str,
        chassis: &str,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            task_type: task_type.to_string(),
            track: track.to_string(),
            chassis: chassis.to_string(),
            priority: 5,
            payload,
            created_at: Utc::now(),
            attempt: 0,
            max_attempts,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────

/// Result envelope written by agents to the results topic.
///
/// `result` is kept raw on the wire; consumers decode it into a
/// [`ResultPayload`] keyed by `task_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_id: String,
    pub agent_id: String,
    pub task_type: String,
    pub success: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    pub latency_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl AgentResult {
    /// Decode the nested result for the envelope's task type.
    pub fn payload(&self) -> Result<ResultPayload, serde_json::Error> {
        ResultPayload::decode(&self.task_type, &self.result)
    }
}

/// Typed view of a result object.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Eda(EdaOutput),
    Explainer(ExplainerOutput),
    /// A task type this relay does not render.
    Unknown { task_type: String },
}

impl ResultPayload {
    pub fn decode(task_type: &str, raw: &serde_json::Value) -> Result<Self, serde_json::Error> {
        match task_type {
            task_type::EDA => Ok(Self::Eda(EdaOutput::deserialize(raw)?)),
            task_type::EXPLAINER => Ok(Self::Explainer(ExplainerOutput::deserialize(raw)?)),
            other => Ok(Self::Unknown {
                task_type: other.to_string(),
            }),
        }
    }
}

/// Sector ranking for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdaOutput {
    pub window_id: String,
    pub track: String,
    pub chassis: String,
    pub fastest_sector: u32,
    pub slowest_sector: u32,
    pub peak_lateral_sector: u32,
    pub peak_lateral_g: f64,
    /// Difference between fastest and slowest sector average speed (km/h).
    pub speed_spread: f64,
    pub sectors_analyzed: usize,
}

/// Rendered explanation produced by an explainer agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainerOutput {
    pub title: String,
    pub severity: Severity,
    pub score: f64,
    pub explanation: String,
    #[serde(default)]
    pub evidence: Vec<TelemetrySample>,
    pub recommendation: String,
    pub track: String,
    pub chassis: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(task_type: &str, result: serde_json::Value) -> AgentResult {
        AgentResult {
            task_id: "t-1".to_string(),
            agent_id: "a-1".to_string(),
            task_type: task_type.to_string(),
            success: true,
            result,
            latency_ms: 12,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn explainer_result_decodes_to_typed_payload() {
        let result = envelope(
            "explainer",
            json!({
                "title": "Tire load spike in sector 2",
                "severity": "high",
                "score": 81.0,
                "explanation": "x",
                "recommendation": "y",
                "track": "cota",
                "chassis": "GR86-004",
            }),
        );
        match result.payload().unwrap() {
            ResultPayload::Explainer(out) => {
                assert_eq!(out.severity, Severity::High);
                assert!(out.evidence.is_empty());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn mismatched_shape_is_an_error() {
        let result = envelope("eda", json!({"title": "not an eda result"}));
        assert!(result.payload().is_err());
    }

    #[test]
    fn unknown_task_type_is_preserved() {
        let result = envelope("simulation", json!({"anything": 1}));
        assert_eq!(
            result.payload().unwrap(),
            ResultPayload::Unknown {
                task_type: "simulation".to_string()
            }
        );
    }
}
