//! Embedded durable log on sled.
//!
//! Layout:
//!
//! | Tree | Key | Value |
//! |---|---|---|
//! | `stream/<topic>` | entry id (BE u64) | payload |
//! | `groups` | `<topic>\x1f<group>` | cursor: last delivered id (BE u64) |
//! | `pending/<topic>/<group>` | entry id (BE u64) | [`PendingEntry`] JSON |
//! | `expiry/<topic>/<group>` | delivered-at ms (BE u64) + entry id (BE u64) | empty |
//! | `kv/<keyspace>` | key | value |
//!
//! Ids come from `Db::generate_id` (+1, so 0 is the origin) and are
//! therefore increasing across restarts. Taking an id and inserting it
//! happen under the claim lock, so a reader never advances a cursor past
//! an id that is not in the stream yet.
//!
//! The expiry tree indexes pending entries by delivery time; reclaiming
//! expired entries walks it only up to the visibility horizon.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{EntryId, LogEntry, LogError, ReadFrom, StreamLog};
use crate::config::LogConfig;

const GROUPS_TREE: &str = "groups";

/// Trim a topic once every this many appends to the log.
const TRIM_EVERY: u64 = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingEntry {
    consumer: String,
    delivered_at_ms: u64,
    delivery_count: u32,
}

pub struct SledLog {
    db: sled::Db,
    groups: sled::Tree,
    visibility_timeout: Duration,
    max_len: usize,
    /// Serializes cursor and pending-list updates. Never held across an await.
    claim_lock: Mutex<()>,
    appended: Notify,
    appends: AtomicU64,
}

impl SledLog {
    /// Open (or create) a log at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: &LogConfig) -> Result<Self, LogError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Durable log opened");
        Self::from_db(db, config)
    }

    /// In-memory log, discarded on drop.
    pub fn temporary(config: &LogConfig) -> Result<Self, LogError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, config)
    }

    fn from_db(db: sled::Db, config: &LogConfig) -> Result<Self, LogError> {
        let groups = db.open_tree(GROUPS_TREE)?;
        Ok(Self {
            db,
            groups,
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            max_len: config.stream_max_len.max(1),
            claim_lock: Mutex::new(()),
            appended: Notify::new(),
            appends: AtomicU64::new(0),
        })
    }

    /// Override the visibility timeout (tests use sub-second values).
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Drop every topic, group and keyspace.
    pub fn reset(&self) -> Result<(), LogError> {
        let _guard = self.lock();
        for name in self.db.tree_names() {
            let raw: &[u8] = &name;
            if raw == b"__sled__default".as_slice() || raw == GROUPS_TREE.as_bytes() {
                continue;
            }
            self.db.drop_tree(&name)?;
        }
        self.groups.clear()?;
        self.db.flush()?;
        info!("Durable log reset");
        Ok(())
    }

    pub fn flush(&self) -> Result<(), LogError> {
        self.db.flush()?;
        Ok(())
    }

    /// Entries delivered to `group` and not yet acknowledged.
    pub fn pending_count(&self, topic: &str, group: &str) -> Result<usize, LogError> {
        Ok(self.pending_tree(topic, group)?.len())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.claim_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stream_tree(&self, topic: &str) -> Result<sled::Tree, LogError> {
        Ok(self.db.open_tree(format!("stream/{topic}"))?)
    }

    fn pending_tree(&self, topic: &str, group: &str) -> Result<sled::Tree, LogError> {
        Ok(self.db.open_tree(format!("pending/{topic}/{group}"))?)
    }

    fn expiry_tree(&self, topic: &str, group: &str) -> Result<sled::Tree, LogError> {
        Ok(self.db.open_tree(format!("expiry/{topic}/{group}"))?)
    }

    fn kv_tree(&self, keyspace: &str) -> Result<sled::Tree, LogError> {
        Ok(self.db.open_tree(format!("kv/{keyspace}"))?)
    }

    fn cursor(&self, topic: &str, group: &str) -> Result<u64, LogError> {
        self.groups
            .get(group_key(topic, group))?
            .map(|raw| decode_id(&raw))
            .ok_or_else(|| LogError::NoGroup {
                topic: topic.to_string(),
                group: group.to_string(),
            })
    }

    /// Drop the oldest entries of `topic` beyond the configured length.
    fn trim(&self, topic: &str) -> Result<(), LogError> {
        let stream = self.stream_tree(topic)?;
        let excess = stream.len().saturating_sub(self.max_len);
        if excess == 0 {
            return Ok(());
        }
        for item in stream.iter().keys().take(excess) {
            stream.remove(item?)?;
        }
        debug!(topic, removed = excess, "Trimmed topic");
        Ok(())
    }

    fn claim_new(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<LogEntry>, LogError> {
        let _guard = self.lock();
        let cursor = self.cursor(topic, group)?;
        let stream = self.stream_tree(topic)?;
        let pending = self.pending_tree(topic, group)?;
        let expiry = self.expiry_tree(topic, group)?;
        let now = now_ms();
        let visibility_ms = self.visibility_timeout.as_millis() as u64;
        let mut out = Vec::new();

        // Expired pending entries first, oldest delivery first.
        let horizon = expiry_key(now.saturating_sub(visibility_ms), u64::MAX);
        let expired = expiry
            .range(..=horizon)
            .keys()
            .take(count)
            .collect::<Result<Vec<_>, _>>()?;
        for key in expired {
            let id = decode_id(&key[8..]);
            let id_key = id.to_be_bytes();
            let Some(raw) = pending.get(id_key)? else {
                expiry.remove(&key)?;
                continue;
            };
            let mut entry: PendingEntry = serde_json::from_slice(&raw)?;
            let Some(payload) = stream.get(id_key)? else {
                // trimmed while pending
                forget_pending(&pending, &expiry, id)?;
                continue;
            };
            expiry.remove(&key)?;
            entry.consumer = consumer.to_string();
            entry.delivered_at_ms = now;
            entry.delivery_count += 1;
            track_pending(&pending, &expiry, id, &entry)?;
            out.push(LogEntry {
                id: EntryId(id),
                payload: payload.to_vec(),
                delivery_count: entry.delivery_count,
            });
        }

        // Then entries past the cursor.
        let mut last = cursor;
        if out.len() < count {
            let start = cursor.saturating_add(1).to_be_bytes();
            for item in stream.range(start..).take(count - out.len()) {
                let (key, payload) = item?;
                let fresh = PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at_ms: now,
                    delivery_count: 1,
                };
                last = decode_id(&key);
                track_pending(&pending, &expiry, last, &fresh)?;
                out.push(LogEntry {
                    id: EntryId(last),
                    payload: payload.to_vec(),
                    delivery_count: 1,
                });
            }
        }
        if last != cursor {
            self.groups
                .insert(group_key(topic, group), &last.to_be_bytes()[..])?;
        }

        Ok(out)
    }

    fn claim_pending(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        after: EntryId,
        count: usize,
    ) -> Result<Vec<LogEntry>, LogError> {
        let _guard = self.lock();
        self.cursor(topic, group)?;
        let stream = self.stream_tree(topic)?;
        let pending = self.pending_tree(topic, group)?;
        let expiry = self.expiry_tree(topic, group)?;
        let now = now_ms();
        let mut mine = Vec::new();

        let start = after.0.saturating_add(1).to_be_bytes();
        for item in pending.range(start..) {
            if mine.len() >= count {
                break;
            }
            let (key, raw) = item?;
            let entry: PendingEntry = serde_json::from_slice(&raw)?;
            if entry.consumer == consumer {
                mine.push((decode_id(&key), entry));
            }
        }

        let mut out = Vec::with_capacity(mine.len());
        for (id, mut entry) in mine {
            let Some(payload) = stream.get(id.to_be_bytes())? else {
                forget_pending(&pending, &expiry, id)?;
                continue;
            };
            expiry.remove(expiry_key(entry.delivered_at_ms, id))?;
            entry.delivered_at_ms = now;
            entry.delivery_count += 1;
            track_pending(&pending, &expiry, id, &entry)?;
            out.push(LogEntry {
                id: EntryId(id),
                payload: payload.to_vec(),
                delivery_count: entry.delivery_count,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl StreamLog for SledLog {
    async fn append(&self, topic: &str, payload: &[u8]) -> Result<EntryId, LogError> {
        let stream = self.stream_tree(topic)?;
        let id = {
            let _guard = self.lock();
            let id = self.db.generate_id()? + 1;
            stream.insert(id.to_be_bytes(), payload)?;
            id
        };
        if self.appends.fetch_add(1, Ordering::Relaxed) % TRIM_EVERY == TRIM_EVERY - 1 {
            self.trim(topic)?;
        }
        self.appended.notify_waiters();
        Ok(EntryId(id))
    }

    async fn ensure_group(&self, topic: &str, group: &str) -> Result<bool, LogError> {
        let created = self
            .groups
            .compare_and_swap(
                group_key(topic, group),
                None as Option<&[u8]>,
                Some(&0u64.to_be_bytes()[..]),
            )?
            .is_ok();
        if created {
            debug!(topic, group, "Consumer group created");
        }
        Ok(created)
    }

    async fn read_group(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        block: Duration,
    ) -> Result<Vec<LogEntry>, LogError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if let ReadFrom::Pending { after } = from {
            return self.claim_pending(topic, group, consumer, after, count);
        }

        let deadline = tokio::time::Instant::now() + block;
        loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let entries = self.claim_new(topic, group, consumer, count)?;
            if !entries.is_empty() {
                return Ok(entries);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, topic: &str, group: &str, ids: &[EntryId]) -> Result<usize, LogError> {
        let _guard = self.lock();
        self.cursor(topic, group)?;
        let pending = self.pending_tree(topic, group)?;
        let expiry = self.expiry_tree(topic, group)?;
        let mut acked = 0;
        for id in ids {
            if forget_pending(&pending, &expiry, id.0)? {
                acked += 1;
            }
        }
        Ok(acked)
    }

    async fn ping(&self) -> Result<(), LogError> {
        self.db.size_on_disk()?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), LogError> {
        self.db.flush_async().await?;
        Ok(())
    }

    async fn topic_len(&self, topic: &str) -> Result<usize, LogError> {
        Ok(self.stream_tree(topic)?.len())
    }

    async fn put_key(&self, keyspace: &str, key: &str, value: &[u8]) -> Result<(), LogError> {
        self.kv_tree(keyspace)?.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn get_key(&self, keyspace: &str, key: &str) -> Result<Option<Vec<u8>>, LogError> {
        Ok(self
            .kv_tree(keyspace)?
            .get(key.as_bytes())?
            .map(|v| v.to_vec()))
    }

    async fn scan_keys(&self, keyspace: &str) -> Result<Vec<(String, Vec<u8>)>, LogError> {
        self.kv_tree(keyspace)?
            .iter()
            .map(|item| {
                let (k, v) = item?;
                Ok((String::from_utf8_lossy(&k).into_owned(), v.to_vec()))
            })
            .collect()
    }
}

fn expiry_key(delivered_at_ms: u64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&delivered_at_ms.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

/// Record `entry` as pending and index it by delivery time. Any previous
/// index key must already be removed.
fn track_pending(
    pending: &sled::Tree,
    expiry: &sled::Tree,
    id: u64,
    entry: &PendingEntry,
) -> Result<(), LogError> {
    pending.insert(id.to_be_bytes(), serde_json::to_vec(entry)?)?;
    expiry.insert(expiry_key(entry.delivered_at_ms, id), &[][..])?;
    Ok(())
}

/// Drop a pending entry and its index key. Returns whether it was pending.
fn forget_pending(pending: &sled::Tree, expiry: &sled::Tree, id: u64) -> Result<bool, LogError> {
    let Some(raw) = pending.remove(id.to_be_bytes())? else {
        return Ok(false);
    };
    if let Ok(entry) = serde_json::from_slice::<PendingEntry>(&raw) {
        expiry.remove(expiry_key(entry.delivered_at_ms, id))?;
    }
    Ok(true)
}

fn group_key(topic: &str, group: &str) -> Vec<u8> {
    format!("{topic}\x1f{group}").into_bytes()
}

fn decode_id(raw: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = raw.len().min(8);
    buf[8 - len..].copy_from_slice(&raw[raw.len() - len..]);
    u64::from_be_bytes(buf)
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config() -> LogConfig {
        LogConfig {
            visibility_timeout_secs: 30,
            stream_max_len: 1_000,
            ..LogConfig::default()
        }
    }

    fn log() -> SledLog {
        SledLog::temporary(&config()).unwrap()
    }

    const NO_WAIT: Duration = Duration::ZERO;

    #[tokio::test]
    async fn ensure_group_is_idempotent() {
        let log = log();
        assert!(log.ensure_group("t", "g").await.unwrap());
        assert!(!log.ensure_group("t", "g").await.unwrap());
    }

    #[tokio::test]
    async fn read_without_group_fails() {
        let log = log();
        log.append("t", b"x").await.unwrap();
        let err = log
            .read_group("t", "missing", "c", ReadFrom::New, 10, NO_WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::NoGroup { .. }));
    }

    #[tokio::test]
    async fn group_created_after_appends_starts_at_origin() {
        let log = log();
        for i in 0..3u8 {
            log.append("t", &[i]).await.unwrap();
        }
        log.ensure_group("t", "g").await.unwrap();
        let entries = log.read_group("t", "g", "c", ReadFrom::New, 10, NO_WAIT).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.payload[0]).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(entries.iter().all(|e| e.delivery_count == 1));
    }

    #[tokio::test]
    async fn each_entry_goes_to_one_group_member() {
        let log = log();
        log.ensure_group("t", "g").await.unwrap();
        for i in 0..4u8 {
            log.append("t", &[i]).await.unwrap();
        }
        let a = log.read_group("t", "g", "a", ReadFrom::New, 2, NO_WAIT).await.unwrap();
        let b = log.read_group("t", "g", "b", ReadFrom::New, 10, NO_WAIT).await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(a.iter().all(|x| b.iter().all(|y| x.id != y.id)));
    }

    #[tokio::test]
    async fn groups_have_independent_cursors() {
        let log = log();
        log.ensure_group("t", "g1").await.unwrap();
        log.ensure_group("t", "g2").await.unwrap();
        log.append("t", b"x").await.unwrap();
        assert_eq!(log.read_group("t", "g1", "c", ReadFrom::New, 10, NO_WAIT).await.unwrap().len(), 1);
        assert_eq!(log.read_group("t", "g2", "c", ReadFrom::New, 10, NO_WAIT).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ack_removes_pending() {
        let log = log();
        log.ensure_group("t", "g").await.unwrap();
        let id = log.append("t", b"x").await.unwrap();
        log.read_group("t", "g", "c", ReadFrom::New, 10, NO_WAIT).await.unwrap();
        assert_eq!(log.pending_count("t", "g").unwrap(), 1);
        assert_eq!(log.ack("t", "g", &[id, EntryId(999_999)]).await.unwrap(), 1);
        assert_eq!(log.pending_count("t", "g").unwrap(), 0);
        assert_eq!(log.ack("t", "g", &[id]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn expired_pending_entries_are_reclaimed() {
        let log = log().with_visibility_timeout(Duration::from_millis(30));
        log.ensure_group("t", "g").await.unwrap();
        log.append("t", b"x").await.unwrap();

        let first = log.read_group("t", "g", "a", ReadFrom::New, 10, NO_WAIT).await.unwrap();
        assert_eq!(first[0].delivery_count, 1);
        // still inside the visibility timeout
        assert!(log.read_group("t", "g", "b", ReadFrom::New, 10, NO_WAIT).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let again = log.read_group("t", "g", "b", ReadFrom::New, 10, NO_WAIT).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, first[0].id);
        assert_eq!(again[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn reclaim_takes_only_expired_deliveries() {
        let log = log().with_visibility_timeout(Duration::from_millis(100));
        log.ensure_group("t", "g").await.unwrap();
        for payload in [b"1", b"2", b"3"] {
            log.append("t", payload).await.unwrap();
        }

        let early = log.read_group("t", "g", "a", ReadFrom::New, 1, NO_WAIT).await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        let later = log.read_group("t", "g", "a", ReadFrom::New, 10, NO_WAIT).await.unwrap();
        assert_eq!(later.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let reclaimed = log.read_group("t", "g", "b", ReadFrom::New, 10, NO_WAIT).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, early[0].id);

        // acked entries drop out of the expiry order
        log.ack("t", "g", &[later[0].id]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let ids: Vec<_> = log
            .read_group("t", "g", "c", ReadFrom::New, 10, NO_WAIT)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&early[0].id));
        assert!(ids.contains(&later[1].id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_all_delivered() {
        const WRITERS: u32 = 4;
        const PER_WRITER: u32 = 100;
        let log = Arc::new(log());
        log.ensure_group("t", "g").await.unwrap();

        let reader = {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut seen = std::collections::BTreeSet::new();
                let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
                while seen.len() < (WRITERS * PER_WRITER) as usize
                    && tokio::time::Instant::now() < deadline
                {
                    let entries = log
                        .read_group("t", "g", "c", ReadFrom::New, 7, Duration::from_millis(20))
                        .await
                        .unwrap();
                    for entry in entries {
                        seen.insert(entry.payload);
                    }
                }
                seen
            })
        };

        let mut writers = Vec::new();
        for w in 0..WRITERS {
            let log = Arc::clone(&log);
            writers.push(tokio::spawn(async move {
                for i in 0..PER_WRITER {
                    log.append("t", &(w * PER_WRITER + i).to_be_bytes()).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        let seen = reader.await.unwrap();
        assert_eq!(seen.len(), (WRITERS * PER_WRITER) as usize);
        assert_eq!(log.pending_count("t", "g").unwrap(), seen.len());
    }

    #[tokio::test]
    async fn pending_read_returns_own_entries_only() {
        let log = log();
        log.ensure_group("t", "g").await.unwrap();
        log.append("t", b"1").await.unwrap();
        log.append("t", b"2").await.unwrap();
        log.read_group("t", "g", "a", ReadFrom::New, 1, NO_WAIT).await.unwrap();
        log.read_group("t", "g", "b", ReadFrom::New, 1, NO_WAIT).await.unwrap();

        let mine = log
            .read_group("t", "g", "a", ReadFrom::Pending { after: EntryId(0) }, 10, NO_WAIT)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].payload, b"1");
        assert_eq!(mine[0].delivery_count, 2);

        let rest = log
            .read_group("t", "g", "a", ReadFrom::Pending { after: mine[0].id }, 10, NO_WAIT)
            .await
            .unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn blocking_read_wakes_on_append() {
        let log = Arc::new(log());
        log.ensure_group("t", "g").await.unwrap();

        let reader = Arc::clone(&log);
        let handle = tokio::spawn(async move {
            reader
                .read_group("t", "g", "c", ReadFrom::New, 10, Duration::from_secs(5))
                .await
                .unwrap()
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        log.append("t", b"late").await.unwrap();

        let entries = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn blocking_read_times_out_empty() {
        let log = log();
        log.ensure_group("t", "g").await.unwrap();
        let entries = log
            .read_group("t", "g", "c", ReadFrom::New, 10, Duration::from_millis(30))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn topics_are_trimmed_to_max_len() {
        let log = SledLog::temporary(&LogConfig {
            stream_max_len: 10,
            ..config()
        })
        .unwrap();
        for i in 0..(TRIM_EVERY * 2) {
            log.append("t", &i.to_be_bytes()).await.unwrap();
        }
        assert_eq!(log.topic_len("t").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn keyspace_roundtrip() {
        let log = log();
        log.put_key("agents", "a-1", b"{}").await.unwrap();
        log.put_key("agents", "a-2", b"[]").await.unwrap();
        assert_eq!(log.get_key("agents", "a-1").await.unwrap().as_deref(), Some(&b"{}"[..]));
        assert_eq!(log.get_key("agents", "zz").await.unwrap(), None);
        let keys: Vec<_> = log.scan_keys("agents").await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a-1", "a-2"]);
    }

    #[tokio::test]
    async fn reset_drops_everything() {
        let log = log();
        log.ensure_group("t", "g").await.unwrap();
        log.append("t", b"x").await.unwrap();
        log.put_key("agents", "a", b"1").await.unwrap();
        log.reset().unwrap();
        assert_eq!(log.topic_len("t").await.unwrap(), 0);
        assert!(log.scan_keys("agents").await.unwrap().is_empty());
        assert!(log.ensure_group("t", "g").await.unwrap());
    }
}
