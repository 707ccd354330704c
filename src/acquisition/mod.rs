//! Telemetry acquisition
//!
//! UDP datagrams are parsed into [`TelemetrySample`](crate::types::TelemetrySample)s,
//! stored in a fixed-memory [`SharedRing`] and forwarded to the raw-update
//! [`TelemetryBatcher`].

mod failure_log;
pub mod batcher;
pub mod listener;
pub mod parser;
pub mod ring_buffer;

pub use batcher::TelemetryBatcher;
pub use failure_log::ParseFailureLog;
pub use listener::{
    channel_callback, DatagramIngest, IngestSnapshot, IngestStats, ListenerError, SampleCallback,
    TelemetryListener,
};
pub use parser::{parse_datagram, ParseError};
pub use ring_buffer::{RingBuffer, SharedRing};
