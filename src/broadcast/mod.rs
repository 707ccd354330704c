//! Real-time broadcast to dashboard subscribers
//!
//! - [`FanoutHub`]: connected subscriber set with per-subscriber byte
//!   accounting; slow subscribers are shed, never waited on
//! - [`InsightCache`]: bounded recency cache for catch-up and point lookup
//! - [`ResultDelivery`] / [`AggregateDelivery`]: log consumers feeding the hub
//! - [`pump_raw_telemetry`]: listener samples batched into `telemetry_update`

pub mod delivery;
pub mod fanout;
pub mod insight_cache;

pub use delivery::{pump_raw_telemetry, AggregateDelivery, ResultDelivery};
pub use fanout::{BroadcastReport, FanoutHub, Subscription};
pub use insight_cache::InsightCache;
