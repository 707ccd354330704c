//! Task workers for the built-in agents
//!
//! Each worker handles one task type and turns an aggregate window into a
//! result object:
//!
//! 1. **Eda** (`eda`) - sector ranking
//! 2. **Explainer** (`explainer`) - tire-load insight with severity

pub mod eda;
pub mod explainer;

pub use eda::EdaWorker;
pub use explainer::ExplainerWorker;

use crate::types::{AgentTask, AggregateWindow};

/// A synchronous, deterministic task processor.
pub trait TaskWorker: Send + Sync {
    /// Task type this worker accepts (e.g. "eda").
    fn task_type(&self) -> &'static str;

    /// Process a task, returning the result object for the envelope.
    fn process(&self, task: &AgentTask) -> anyhow::Result<serde_json::Value>;
}

/// One worker per built-in task type.
pub fn default_workers() -> Vec<Box<dyn TaskWorker>> {
    vec![Box::new(EdaWorker), Box::new(ExplainerWorker)]
}

/// Decode the window carried by a window task.
fn window_payload(task: &AgentTask) -> anyhow::Result<AggregateWindow> {
    let window: AggregateWindow = serde_json::from_value(task.payload.clone())?;
    if window.sectors.is_empty() {
        anyhow::bail!("window {} has no sector statistics", window.window_id);
    }
    Ok(window)
}
