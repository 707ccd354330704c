//! API route handlers
//!
//! - Agent registration, heartbeat and listing
//! - Insight lookup from the recency cache
//! - Relay status and liveness
//! - WebSocket subscriber endpoint

mod agents;
mod insights;
mod status;
mod ws;

pub use agents::*;
pub use insights::*;
pub use status::*;
pub use ws::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::acquisition::{IngestStats, SharedRing};
use crate::broadcast::{FanoutHub, InsightCache};
use crate::dispatch::Dispatcher;
use crate::stream::ConsumerState;
use crate::types::TelemetrySample;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub hub: Arc<FanoutHub>,
    pub insights: Arc<InsightCache>,
    pub ring: SharedRing<TelemetrySample>,
    pub ingest: Arc<IngestStats>,
    /// State of each relay-side consumer loop, keyed by consumer name.
    pub consumers: Arc<BTreeMap<String, watch::Receiver<ConsumerState>>>,
    pub started_at: Instant,
}
