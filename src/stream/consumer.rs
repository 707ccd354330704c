//! Stream consumer loop
//!
//! Drives a [`StreamHandler`] over one topic through a consumer group:
//!
//! ```text
//! Idle -> Reading -> Processing -> Acking -> Idle
//!   \-> Reconnecting -> Idle        (every `ping_every` consecutive errors)
//! ```
//!
//! On start the loop drains its own pending entries (crash recovery), then
//! reads new ones. A bad payload or a failing handler only affects that
//! entry, which stays un-acked and is redelivered after the visibility
//! timeout. A handler that returns [`Deferred`] gets the same redelivery
//! without it counting as a failure. Read/ack errors back off linearly;
//! crossing `max_consecutive_errors` ends the loop with
//! [`ConsumerError::Fatal`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{topics, EntryId, LogEntry, LogError, ReadFrom, StreamLog};
use crate::config::ConsumerSettings;

/// Processes decoded entries of one topic.
///
/// Handlers must be idempotent: an entry can be delivered more than once.
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    type Item: DeserializeOwned + Send;

    /// `Ok` acknowledges the entry, `Err` leaves it for redelivery.
    async fn handle(&self, item: Self::Item, entry: &LogEntry) -> anyhow::Result<()>;

    /// Called once an entry has been moved to the dead-letter topic.
    async fn on_dead_letter(&self, _entry: &LogEntry) {}

    /// Whether decodable entries past `max_deliveries` are dead-lettered.
    /// Handlers whose entries must wait indefinitely return `false`;
    /// undecodable entries are dead-lettered either way.
    fn dead_letters(&self) -> bool {
        true
    }
}

/// Handler outcome for an entry that cannot be acted on yet. It stays
/// pending and comes back after the visibility timeout, logged at debug
/// level and not counted as a handler failure.
#[derive(Debug, Error)]
#[error("deferred: {reason}")]
pub struct Deferred {
    pub reason: String,
}

impl Deferred {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerState {
    Idle,
    Reading,
    Processing,
    Acking,
    Reconnecting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub batches: u64,
    pub handled: u64,
    pub acked: u64,
    pub handler_failures: u64,
    pub deferred: u64,
    pub parse_failures: u64,
    pub dead_lettered: u64,
    pub errors: u64,
    pub reconnects: u64,
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer {consumer} on {topic} gave up after {consecutive} consecutive errors: {last}")]
    Fatal {
        topic: String,
        consumer: String,
        consecutive: u32,
        #[source]
        last: LogError,
    },
}

/// Identity of a consumer within the log.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub topic: String,
    pub group: String,
    pub consumer: String,
}

impl ConsumerOptions {
    pub fn new(topic: impl Into<String>, group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }
}

pub struct ConsumerLoop<H: StreamHandler> {
    log: Arc<dyn StreamLog>,
    handler: Arc<H>,
    options: ConsumerOptions,
    settings: ConsumerSettings,
    state: watch::Sender<ConsumerState>,
    stats: ConsumerStats,
    consecutive_errors: u32,
}

impl<H: StreamHandler> ConsumerLoop<H> {
    pub fn new(
        log: Arc<dyn StreamLog>,
        handler: Arc<H>,
        options: ConsumerOptions,
        settings: ConsumerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            log,
            handler,
            options,
            settings,
            state,
            stats: ConsumerStats::default(),
            consecutive_errors: 0,
        }
    }

    /// Observe the loop state. Subscribe before calling [`run`](Self::run).
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    /// Run until cancelled or until the error ceiling is crossed.
    ///
    /// Cancellation is honoured between batches: a batch that has been read
    /// is always processed and acknowledged first.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ConsumerStats, ConsumerError> {
        let ConsumerOptions {
            topic,
            group,
            consumer,
        } = self.options.clone();
        let block = Duration::from_millis(self.settings.block_ms);

        let mut need_group = true;
        let mut recovering = true;
        let mut recovered_up_to = EntryId::default();

        info!(topic = %topic, group = %group, consumer = %consumer, "Consumer started");

        while !cancel.is_cancelled() {
            if need_group {
                match self.log.ensure_group(&topic, &group).await {
                    Ok(created) => {
                        need_group = false;
                        if created {
                            info!(topic = %topic, group = %group, "Created consumer group at origin");
                        }
                    }
                    Err(e) => {
                        self.on_error(e, &cancel).await?;
                        continue;
                    }
                }
            }

            self.set_state(ConsumerState::Reading);
            let (from, wait) = if recovering {
                (ReadFrom::Pending { after: recovered_up_to }, Duration::ZERO)
            } else {
                (ReadFrom::New, block)
            };

            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = self.log.read_group(&topic, &group, &consumer, from, self.settings.batch_size, wait) => read,
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(e) => {
                    if matches!(e, LogError::NoGroup { .. }) {
                        warn!(topic = %topic, group = %group, "Consumer group vanished, recreating");
                        need_group = true;
                    }
                    self.on_error(e, &cancel).await?;
                    continue;
                }
            };

            if recovering {
                match entries.last() {
                    Some(last) => recovered_up_to = last.id,
                    None => {
                        recovering = false;
                        debug!(topic = %topic, consumer = %consumer, "Pending entries drained");
                        self.consecutive_errors = 0;
                        self.set_state(ConsumerState::Idle);
                        continue;
                    }
                }
            }
            if entries.is_empty() {
                self.consecutive_errors = 0;
                self.set_state(ConsumerState::Idle);
                continue;
            }

            self.stats.batches += 1;
            self.set_state(ConsumerState::Processing);
            let succeeded = self.process_batch(&topic, &entries).await;

            if !succeeded.is_empty() {
                self.set_state(ConsumerState::Acking);
                match self.log.ack(&topic, &group, &succeeded).await {
                    Ok(n) => self.stats.acked += n as u64,
                    Err(e) => {
                        self.on_error(e, &cancel).await?;
                        continue;
                    }
                }
            }
            // Only a read plus its ack clears the error streak.
            self.consecutive_errors = 0;
            self.set_state(ConsumerState::Idle);
        }

        self.set_state(ConsumerState::Idle);
        info!(topic = %topic, consumer = %consumer, stats = ?self.stats, "Consumer stopped");
        Ok(self.stats)
    }

    /// Handle every entry; return the ids to acknowledge.
    async fn process_batch(&mut self, topic: &str, entries: &[LogEntry]) -> Vec<EntryId> {
        let mut succeeded = Vec::with_capacity(entries.len());

        for entry in entries {
            let over_budget = entry.delivery_count > self.settings.max_deliveries;

            let item = match entry.decode::<H::Item>() {
                Ok(item) => item,
                Err(e) => {
                    if over_budget {
                        if self.dead_letter(topic, entry).await {
                            succeeded.push(entry.id);
                        }
                        continue;
                    }
                    self.stats.parse_failures += 1;
                    warn!(topic, id = %entry.id, error = %e, "Unparseable entry left for redelivery");
                    continue;
                }
            };

            if over_budget && self.handler.dead_letters() {
                if self.dead_letter(topic, entry).await {
                    succeeded.push(entry.id);
                }
                continue;
            }

            match self.handler.handle(item, entry).await {
                Ok(()) => {
                    self.stats.handled += 1;
                    succeeded.push(entry.id);
                }
                Err(e) if e.is::<Deferred>() => {
                    self.stats.deferred += 1;
                    debug!(topic, id = %entry.id, attempt = entry.delivery_count, "{}", e);
                }
                Err(e) => {
                    self.stats.handler_failures += 1;
                    warn!(
                        topic,
                        id = %entry.id,
                        attempt = entry.delivery_count,
                        error = %e,
                        "Handler failed, entry left for redelivery"
                    );
                }
            }
        }

        succeeded
    }

    async fn dead_letter(&mut self, topic: &str, entry: &LogEntry) -> bool {
        let dead_topic = topics::dead_letter(topic);
        match self.log.append(&dead_topic, &entry.payload).await {
            Ok(_) => {
                self.stats.dead_lettered += 1;
                warn!(
                    topic,
                    id = %entry.id,
                    deliveries = entry.delivery_count,
                    dead_topic = %dead_topic,
                    "Entry exceeded its delivery budget, dead-lettered"
                );
                self.handler.on_dead_letter(entry).await;
                true
            }
            Err(e) => {
                warn!(topic, id = %entry.id, error = %e, "Dead-letter append failed");
                false
            }
        }
    }

    /// Count a read/ack failure: reconnect every `ping_every`, give up at
    /// the ceiling, otherwise back off.
    async fn on_error(&mut self, e: LogError, cancel: &CancellationToken) -> Result<(), ConsumerError> {
        self.consecutive_errors += 1;
        self.stats.errors += 1;
        let n = self.consecutive_errors;

        if n >= self.settings.max_consecutive_errors {
            error!(
                topic = %self.options.topic,
                consumer = %self.options.consumer,
                consecutive = n,
                error = %e,
                "Consumer error ceiling reached"
            );
            self.set_state(ConsumerState::Idle);
            return Err(ConsumerError::Fatal {
                topic: self.options.topic.clone(),
                consumer: self.options.consumer.clone(),
                consecutive: n,
                last: e,
            });
        }

        warn!(topic = %self.options.topic, consecutive = n, error = %e, "Stream error");

        if n % self.settings.ping_every == 0 {
            self.set_state(ConsumerState::Reconnecting);
            self.stats.reconnects += 1;
            match self.log.ping().await {
                Ok(()) => debug!("Log ping ok"),
                Err(ping_err) => warn!(error = %ping_err, "Log ping failed"),
            }
            match self.log.reconnect().await {
                Ok(()) => info!(topic = %self.options.topic, "Reconnected to log"),
                Err(re) => warn!(error = %re, "Reconnect failed"),
            }
        }

        let backoff = backoff(&self.settings, n);
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(backoff) => {}
        }
        self.set_state(ConsumerState::Idle);
        Ok(())
    }
}

/// `step * n`, capped.
fn backoff(settings: &ConsumerSettings, consecutive: u32) -> Duration {
    let ms = settings
        .backoff_step_ms
        .saturating_mul(u64::from(consecutive))
        .min(settings.backoff_cap_ms);
    Duration::from_millis(ms)
}
