//! System-wide default constants.
//!
//! Centralises magic numbers used across the relay. Grouped by subsystem
//! for easy discovery. Every value here can be overridden through
//! `racewire.toml` unless stated otherwise.

// ============================================================================
// Server
// ============================================================================

/// HTTP / WebSocket bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

// ============================================================================
// Ingestion
// ============================================================================

/// UDP bind address for telemetry datagrams.
pub const UDP_BIND_ADDR: &str = "0.0.0.0:20777";

/// Ring buffer capacity (samples).
///
/// 6 000 = 5 minutes of one car at 20 Hz.
pub const RING_BUFFER_CAPACITY: usize = 6_000;

/// Largest datagram the listener will read (bytes).
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

/// Requested kernel receive buffer for the UDP socket (bytes).
pub const UDP_RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Parse-failure log window (ms). At most one warning per window.
pub const PARSE_LOG_WINDOW_MS: u64 = 5_000;

/// Raw-update batch flushes at this many points.
pub const BATCH_MAX_POINTS: usize = 40;

/// Raw-update batch flushes after this long (ms) since its first point.
pub const BATCH_MAX_AGE_MS: u64 = 300;

/// Capacity of the listener -> batcher channel (samples). Overflow is dropped.
pub const RAW_CHANNEL_CAPACITY: usize = 4_096;

// ============================================================================
// Aggregation
// ============================================================================

/// Aggregation tick (ms).
pub const AGGREGATION_TICK_MS: u64 = 600;

/// Maximum samples taken from the ring buffer per cycle.
pub const AGGREGATION_SNAPSHOT_POINTS: usize = 500;

/// Evidence frames attached to each aggregate window.
pub const EVIDENCE_POINTS: usize = 12;

// ============================================================================
// Registry / Dispatch
// ============================================================================

/// Expected agent heartbeat interval (seconds).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Agent is unroutable once silent for this long (seconds). 3 missed beats.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Default attempt budget for a dispatched task.
pub const TASK_MAX_ATTEMPTS: u32 = 3;

/// Task types created for every aggregate window.
pub const WINDOW_TASK_TYPES: &[&str] = &["eda", "explainer"];

// ============================================================================
// Durable Log
// ============================================================================

/// sled directory for the durable log.
pub const LOG_DATA_DIR: &str = "./data/log";

/// Un-acked entries become claimable by other group members after this (seconds).
pub const VISIBILITY_TIMEOUT_SECS: u64 = 30;

/// Approximate per-topic retention (entries).
pub const STREAM_MAX_LEN: usize = 10_000;

// ============================================================================
// Stream Consumer
// ============================================================================

/// Entries requested per read.
pub const CONSUMER_BATCH_SIZE: usize = 32;

/// Blocking read timeout (ms).
pub const CONSUMER_BLOCK_MS: u64 = 2_000;

/// Ping + reconnect the broker on every Nth consecutive error.
pub const CONSUMER_PING_EVERY: u32 = 5;

/// Consecutive errors after which the consumer gives up.
pub const CONSUMER_MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Linear back-off step (ms). `delay = step * consecutive_errors`.
pub const CONSUMER_BACKOFF_STEP_MS: u64 = 1_000;

/// Back-off ceiling (ms).
pub const CONSUMER_BACKOFF_CAP_MS: u64 = 10_000;

/// Deliveries after which an entry is dead-lettered.
pub const CONSUMER_MAX_DELIVERIES: u32 = 16;

// ============================================================================
// Agents
// ============================================================================

/// Concurrent tasks each built-in agent advertises.
pub const AGENT_CAPACITY: u32 = 4;

// ============================================================================
// Broadcast
// ============================================================================

/// Per-subscriber outbound ceiling (bytes). Over it, messages are shed.
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// Insights kept for point lookup.
pub const INSIGHT_CACHE_CAPACITY: usize = 200;
