//! Agent registry and task dispatch
//!
//! - [`AgentRegistry`]: live agents, heartbeat liveness, least-loaded selection
//! - [`Dispatcher`]: registration, placement onto per-agent streams or the backlog
//! - [`BacklogRouter`], [`LoadSettler`]: the dispatcher's own log consumers
//! - [`WindowPublisher`]: aggregator sink feeding the log and the dispatcher

pub mod dispatcher;
pub mod publisher;
pub mod registry;

pub use dispatcher::{BacklogRouter, DispatchError, Dispatcher, LoadSettler, Placement};
pub use publisher::WindowPublisher;
pub use registry::{matches_track, AgentRegistry, AgentView};
