//! Durable log substrate
//!
//! Every cross-component hand-off after ingestion goes through an ordered,
//! append-only log with consumer-group cursors:
//!
//! - producers [`StreamLog::append`] JSON payloads to a topic
//! - each consumer group has its own cursor; an entry is delivered to one
//!   member of the group and stays *pending* until acknowledged
//! - pending entries older than the visibility timeout are re-claimed by the
//!   next reader of the group (at-least-once delivery)
//!
//! [`SledLog`] is the embedded implementation. [`ConsumerLoop`] drives a
//! [`StreamHandler`] over a topic.

pub mod consumer;
pub mod sled_log;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use consumer::{
    ConsumerError, ConsumerLoop, ConsumerOptions, ConsumerState, ConsumerStats, Deferred,
    StreamHandler,
};
pub use sled_log::SledLog;

/// Topic and keyspace names.
pub mod topics {
    /// Aggregate windows produced by the aggregator.
    pub const AGGREGATES: &str = "telemetry.aggregates";
    /// Tasks no agent could take at enqueue time.
    pub const TASK_BACKLOG: &str = "tasks.backlog";
    /// Results published by agents.
    pub const RESULTS: &str = "results";
    /// Agent registrations, keyed by agent id.
    pub const AGENTS_KEYSPACE: &str = "agents";

    /// Work stream of a single agent.
    pub fn agent_tasks(agent_id: &str) -> String {
        format!("tasks.agent.{agent_id}")
    }

    /// Where entries that exceeded their delivery budget end up.
    pub fn dead_letter(topic: &str) -> String {
        format!("{topic}.dead")
    }
}

/// Position of an entry within its topic. Strictly increasing per log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One delivered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: EntryId,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented by every redelivery.
    pub delivery_count: u32,
}

impl LogEntry {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// Expired pending entries of the group first, then never-delivered
    /// entries past the group cursor. Blocks up to the read timeout.
    New,
    /// Entries already pending for this consumer with an id above `after`,
    /// regardless of age. Never blocks.
    Pending { after: EntryId },
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("consumer group {group:?} does not exist on {topic:?}")]
    NoGroup { topic: String, group: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("log unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StreamLog: Send + Sync {
    /// Append a payload, returning its id.
    async fn append(&self, topic: &str, payload: &[u8]) -> Result<EntryId, LogError>;

    /// Create the group cursor at the topic origin if it does not exist.
    /// Returns whether it was created.
    async fn ensure_group(&self, topic: &str, group: &str) -> Result<bool, LogError>;

    /// Read up to `count` entries for `consumer` in `group`.
    async fn read_group(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        block: Duration,
    ) -> Result<Vec<LogEntry>, LogError>;

    /// Acknowledge entries. Returns how many were pending.
    async fn ack(&self, topic: &str, group: &str, ids: &[EntryId]) -> Result<usize, LogError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), LogError>;

    /// Re-establish the connection to the backing store.
    async fn reconnect(&self) -> Result<(), LogError>;

    /// Entries currently stored in `topic`.
    async fn topic_len(&self, topic: &str) -> Result<usize, LogError>;

    async fn put_key(&self, keyspace: &str, key: &str, value: &[u8]) -> Result<(), LogError>;

    async fn get_key(&self, keyspace: &str, key: &str) -> Result<Option<Vec<u8>>, LogError>;

    async fn scan_keys(&self, keyspace: &str) -> Result<Vec<(String, Vec<u8>)>, LogError>;
}

/// Serialize `value` as JSON and append it to `topic`.
pub async fn append_json<T: Serialize + ?Sized>(
    log: &dyn StreamLog,
    topic: &str,
    value: &T,
) -> Result<EntryId, LogError> {
    let payload = serde_json::to_vec(value)?;
    log.append(topic, &payload).await
}
