//! Shared data model for the relay.
//!
//! - [`TelemetrySample`]: one reading from a car
//! - [`AggregateWindow`]: per-sector statistics for one aggregation cycle
//! - [`AgentRegistration`], [`AgentTask`], [`AgentResult`]: dispatch envelopes
//! - [`Insight`]: rendered explainer output kept for point lookup
//! - [`BroadcastMessage`]: what subscribers receive

mod aggregate;
mod agent;
mod insight;
mod messages;
mod telemetry;

pub use aggregate::{AggregateWindow, LapRange, SectorStats};
pub use agent::{
    task_type, AgentRegistration, AgentResult, AgentTask, EdaOutput, ExplainerOutput,
    RegistrationRequest, ResultPayload,
};
pub use insight::{Insight, Severity};
pub use messages::BroadcastMessage;
pub use telemetry::TelemetrySample;
