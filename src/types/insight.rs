//! Human-facing insights rendered from explainer results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentResult, ExplainerOutput, TelemetrySample};

/// Insight severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub task_id: String,
    pub agent_id: String,
    pub track: String,
    pub chassis: String,
    pub title: String,
    pub severity: Severity,
    pub score: f64,
    pub explanation: String,
    pub evidence: Vec<TelemetrySample>,
    pub recommendation: String,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    /// Insight id for a task. Stable, so a redelivered result replaces
    /// the earlier copy instead of adding a second one.
    pub fn id_for_task(task_id: &str) -> String {
        format!("insight-{task_id}")
    }

    pub fn from_explainer(result: &AgentResult, output: ExplainerOutput) -> Self {
        Self {
            id: Self::id_for_task(&result.task_id),
            task_id: result.task_id.clone(),
            agent_id: result.agent_id.clone(),
            track: output.track,
            chassis: output.chassis,
            title: output.title,
            severity: output.severity,
            score: output.score,
            explanation: output.explanation,
            evidence: output.evidence,
            recommendation: output.recommendation,
            created_at: result.completed_at,
        }
    }
}
