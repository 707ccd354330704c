//! racewire: race telemetry relay
//!
//! Ingests live car telemetry over UDP, aggregates it into per-sector
//! windows, dispatches analysis tasks to capability- and track-matched
//! agents over a durable log, and fans their results out to live
//! dashboard subscribers.
//!
//! ## Architecture
//!
//! - **Acquisition**: UDP listener feeding a fixed-capacity ring buffer
//! - **Aggregation**: periodic per-sector statistics off the receive path
//! - **Stream**: durable log substrate and the shared consumer loop
//! - **Dispatch**: agent registry, placement and backlog routing
//! - **Agents**: built-in peer agents using the same log as external ones
//! - **Broadcast**: lossy fan-out to WebSocket subscribers

pub mod acquisition;
pub mod agents;
pub mod aggregation;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod stream;
pub mod tracks;
pub mod types;

pub use config::RelayConfig;
pub use pipeline::{Relay, RelayHandle, TaskName};
pub use stream::{SledLog, StreamLog};
pub use types::{
    AgentRegistration, AgentResult, AgentTask, AggregateWindow, BroadcastMessage, Insight,
    TelemetrySample,
};
