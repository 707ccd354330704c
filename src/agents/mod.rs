//! Built-in peer agents
//!
//! The relay ships two deterministic agents so it is useful without any
//! external analysis fleet. They talk to the rest of the system only
//! through the durable log and the dispatcher's registration calls,
//! exactly like an out-of-process agent would.
//!
//! - **Eda**: sector ranking per window
//! - **Explainer**: tire-load insight per window

pub mod runtime;
pub mod workers;

pub use runtime::{AgentRuntime, TaskHandler};
pub use workers::{default_workers, EdaWorker, ExplainerWorker, TaskWorker};
