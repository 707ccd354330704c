//! Bounded recency cache of rendered insights.
//!
//! Holds the last `capacity` insights for point lookup and catch-up after a
//! reconnect. Re-inserting an id replaces the stored copy and counts as the
//! newest entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::warn;

use crate::types::Insight;

struct CacheInner {
    /// Oldest first.
    order: VecDeque<String>,
    by_id: HashMap<String, Insight>,
}

pub struct InsightCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl InsightCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(CacheInner {
                order: VecDeque::with_capacity(capacity),
                by_id: HashMap::with_capacity(capacity),
            }),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("[InsightCache] lock poisoned, recovering");
            e.into_inner()
        })
    }

    pub fn insert(&self, insight: Insight) {
        let mut inner = self.lock();
        let id = insight.id.clone();
        if inner.by_id.insert(id.clone(), insight).is_some() {
            inner.order.retain(|existing| existing != &id);
        }
        inner.order.push_back(id);

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.by_id.remove(&evicted);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Insight> {
        self.lock().by_id.get(id).cloned()
    }

    /// Up to `limit` insights, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Insight> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use chrono::Utc;

    fn insight(id: &str, title: &str) -> Insight {
        Insight {
            id: id.to_string(),
            task_id: id.to_string(),
            agent_id: "explainer-1".to_string(),
            track: "cota".to_string(),
            chassis: "GR86-004".to_string(),
            title: title.to_string(),
            severity: Severity::Medium,
            score: 30.0,
            explanation: String::new(),
            evidence: Vec::new(),
            recommendation: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let cache = InsightCache::new(2);
        cache.insert(insight("a", "a"));
        cache.insert(insight("b", "b"));
        cache.insert(insight("c", "c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        let ids: Vec<_> = cache.recent(10).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn reinsert_replaces_without_duplicating() {
        let cache = InsightCache::new(3);
        cache.insert(insight("a", "first"));
        cache.insert(insight("b", "b"));
        cache.insert(insight("a", "second"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().title, "second");
        assert_eq!(cache.recent(1)[0].id, "a");
    }

    #[test]
    fn recent_respects_limit() {
        let cache = InsightCache::new(10);
        for i in 0..5 {
            cache.insert(insight(&format!("i{i}"), "x"));
        }
        assert_eq!(cache.recent(3).len(), 3);
        assert_eq!(cache.recent(0).len(), 0);
    }
}
