//! Task placement over the durable log
//!
//! The dispatcher never calls agents directly. A task is appended either to
//! the chosen agent's own stream (`tasks.agent.<id>`) or, when no agent
//! qualifies, to `tasks.backlog`, where [`BacklogRouter`] keeps retrying the
//! placement. [`LoadSettler`] watches `results` to give reserved capacity
//! back.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::registry::AgentRegistry;
use crate::config::DispatchConfig;
use crate::stream::{
    append_json, topics, Deferred, EntryId, LogEntry, LogError, StreamHandler, StreamLog,
};
use crate::tracks::normalize_track;
use crate::types::{AgentRegistration, AgentResult, AgentTask, AggregateWindow, RegistrationRequest};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Where a submitted task ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "placed", rename_all = "snake_case")]
pub enum Placement {
    Agent { agent_id: String, entry: EntryId },
    Backlog { entry: EntryId },
}

pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    log: Arc<dyn StreamLog>,
    settings: DispatchConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, log: Arc<dyn StreamLog>, settings: DispatchConfig) -> Self {
        Self {
            registry,
            log,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub async fn register(&self, request: RegistrationRequest) -> Result<AgentRegistration, DispatchError> {
        self.register_at(request, Utc::now()).await
    }

    /// Validate, normalize, store (last write wins) and mirror into the
    /// agent keyspace.
    pub async fn register_at(
        &self,
        request: RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<AgentRegistration, DispatchError> {
        let registration = build_registration(request, now)?;
        let stored = self.registry.upsert(registration);

        let payload = serde_json::to_vec(&stored).map_err(LogError::from)?;
        self.log
            .put_key(topics::AGENTS_KEYSPACE, &stored.agent_id, &payload)
            .await?;

        info!(
            agent_id = %stored.agent_id,
            capabilities = ?stored.capabilities,
            tracks = ?stored.tracks,
            capacity = stored.capacity,
            "Agent registered"
        );
        Ok(stored)
    }

    /// Refresh an agent's heartbeat. Unknown ids are ignored.
    pub fn heartbeat(&self, agent_id: &str) -> bool {
        let known = self.registry.heartbeat(agent_id);
        if !known {
            debug!(agent_id, "Heartbeat from unregistered agent ignored");
        }
        known
    }

    /// Reload registrations mirrored by a previous run. Restored agents keep
    /// their stored heartbeat and load is reset.
    pub async fn restore_registrations(&self) -> Result<usize, DispatchError> {
        let mut restored = 0;
        for (key, raw) in self.log.scan_keys(topics::AGENTS_KEYSPACE).await? {
            match serde_json::from_slice::<AgentRegistration>(&raw) {
                Ok(mut registration) => {
                    registration.load = 0;
                    self.registry.upsert(registration);
                    restored += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable agent registration"),
            }
        }
        if restored > 0 {
            info!(restored, "Restored agent registrations");
        }
        Ok(restored)
    }

    pub async fn submit(&self, task: AgentTask) -> Result<Placement, DispatchError> {
        self.submit_at(task, Utc::now()).await
    }

    /// Route to the least-loaded eligible agent or park on the backlog.
    /// A task is never dropped for lack of an agent.
    pub async fn submit_at(&self, mut task: AgentTask, now: DateTime<Utc>) -> Result<Placement, DispatchError> {
        task.track = normalize_track(&task.track);

        if let Some(placement) = self.try_place(&task, now).await? {
            return Ok(placement);
        }

        let entry = append_json(self.log.as_ref(), topics::TASK_BACKLOG, &task).await?;
        debug!(task_id = %task.task_id, task_type = %task.task_type, track = %task.track, "No eligible agent, task queued on backlog");
        Ok(Placement::Backlog { entry })
    }

    /// Reserve an agent and append to its stream. `None` when nobody
    /// qualifies.
    async fn try_place(&self, task: &AgentTask, now: DateTime<Utc>) -> Result<Option<Placement>, DispatchError> {
        let Some(agent_id) = self
            .registry
            .select_and_reserve(&task.task_type, &task.track, now)
        else {
            return Ok(None);
        };

        match append_json(self.log.as_ref(), &topics::agent_tasks(&agent_id), task).await {
            Ok(entry) => {
                debug!(task_id = %task.task_id, agent_id = %agent_id, "Task placed");
                Ok(Some(Placement::Agent { agent_id, entry }))
            }
            Err(e) => {
                self.registry.release(&agent_id);
                Err(e.into())
            }
        }
    }

    /// One task per configured window task type, the window as payload.
    pub async fn dispatch_window(&self, window: &AggregateWindow) -> Result<Vec<Placement>, DispatchError> {
        let payload = serde_json::to_value(window).map_err(LogError::from)?;
        let mut placements = Vec::with_capacity(self.settings.window_task_types.len());
        for task_type in &self.settings.window_task_types {
            let task = AgentTask::new(
                task_type,
                &window.track,
                &window.chassis,
                payload.clone(),
                self.settings.max_attempts,
            );
            placements.push(self.submit(task).await?);
        }
        Ok(placements)
    }
}

fn build_registration(
    request: RegistrationRequest,
    now: DateTime<Utc>,
) -> Result<AgentRegistration, DispatchError> {
    let agent_id = request.agent_id.trim().to_string();
    if agent_id.is_empty() {
        return Err(DispatchError::InvalidRegistration("agent_id is empty".to_string()));
    }
    if request.capacity == 0 {
        return Err(DispatchError::InvalidRegistration("capacity must be > 0".to_string()));
    }

    let capabilities: std::collections::BTreeSet<String> = request
        .task_types
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if capabilities.is_empty() {
        return Err(DispatchError::InvalidRegistration("task_types is empty".to_string()));
    }

    let tracks: std::collections::BTreeSet<String> = request
        .tracks
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| normalize_track(t))
        .collect();
    if tracks.is_empty() {
        return Err(DispatchError::InvalidRegistration(
            "tracks is empty (use [\"*\"] for all tracks)".to_string(),
        ));
    }

    Ok(AgentRegistration {
        agent_id,
        capabilities,
        tracks,
        capacity: request.capacity,
        load: 0,
        registered_at: now,
        last_heartbeat: now,
    })
}

// ============================================================================
// Peer consumers
// ============================================================================

/// Re-places backlog tasks once an agent qualifies. Tasks that still cannot
/// be placed are deferred: left un-acked, back after the visibility timeout,
/// never dead-lettered.
pub struct BacklogRouter {
    dispatcher: Arc<Dispatcher>,
}

impl BacklogRouter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl StreamHandler for BacklogRouter {
    type Item = AgentTask;

    async fn handle(&self, task: AgentTask, _entry: &LogEntry) -> anyhow::Result<()> {
        match self.dispatcher.try_place(&task, Utc::now()).await? {
            Some(_) => Ok(()),
            None => Err(Deferred::new(format!(
                "no eligible agent for {} task on {}",
                task.task_type, task.track
            ))
            .into()),
        }
    }

    fn dead_letters(&self) -> bool {
        false
    }
}

/// Remembered task ids so a redelivered result is not released twice.
const SETTLED_MEMORY: usize = 4096;

/// Releases the load reserved for a task when its result arrives.
pub struct LoadSettler {
    registry: Arc<AgentRegistry>,
    settled: Mutex<(VecDeque<String>, HashSet<String>)>,
}

impl LoadSettler {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            settled: Mutex::new((VecDeque::new(), HashSet::new())),
        }
    }

    /// Returns false when this task was already settled.
    fn remember(&self, task_id: &str) -> bool {
        let mut guard = self.settled.lock().unwrap_or_else(|e| e.into_inner());
        let (order, seen) = &mut *guard;
        if !seen.insert(task_id.to_string()) {
            return false;
        }
        order.push_back(task_id.to_string());
        if order.len() > SETTLED_MEMORY {
            if let Some(oldest) = order.pop_front() {
                seen.remove(&oldest);
            }
        }
        true
    }
}

#[async_trait]
impl StreamHandler for LoadSettler {
    type Item = AgentResult;

    async fn handle(&self, result: AgentResult, _entry: &LogEntry) -> anyhow::Result<()> {
        if self.remember(&result.task_id) {
            self.registry.release(&result.agent_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsumerSettings, LogConfig};
    use crate::stream::{ConsumerLoop, ConsumerOptions, ReadFrom, SledLog};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<Dispatcher>, Arc<SledLog>) {
        let log = Arc::new(SledLog::temporary(&LogConfig::default()).unwrap());
        let registry = Arc::new(AgentRegistry::new(Duration::from_secs(30)));
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::clone(&log) as Arc<dyn StreamLog>,
            DispatchConfig::default(),
        ));
        (dispatcher, log)
    }

    fn request(id: &str, types: &[&str], tracks: &[&str], capacity: u32) -> RegistrationRequest {
        RegistrationRequest {
            agent_id: id.to_string(),
            task_types: types.iter().map(|s| (*s).to_string()).collect(),
            tracks: tracks.iter().map(|s| (*s).to_string()).collect(),
            capacity,
        }
    }

    fn task(task_type: &str, track: &str) -> AgentTask {
        AgentTask::new(task_type, track, "GR86-001", json!({}), 3)
    }

    #[tokio::test]
    async fn registration_normalizes_and_mirrors() {
        let (dispatcher, log) = setup();
        let stored = dispatcher
            .register(request("a-1", &["EDA"], &["Road America", "Virginia"], 5))
            .await
            .unwrap();
        assert!(stored.tracks.contains("road_america"));
        assert!(stored.tracks.contains("vir"));
        assert!(stored.capabilities.contains("eda"));

        let mirrored = log.get_key(topics::AGENTS_KEYSPACE, "a-1").await.unwrap().unwrap();
        let mirrored: AgentRegistration = serde_json::from_slice(&mirrored).unwrap();
        assert_eq!(mirrored.tracks, stored.tracks);
    }

    #[tokio::test]
    async fn invalid_registrations_are_rejected() {
        let (dispatcher, _) = setup();
        for bad in [
            request("", &["eda"], &["*"], 1),
            request("a", &[], &["*"], 1),
            request("a", &["eda"], &[], 1),
            request("a", &["eda"], &["*"], 0),
        ] {
            assert!(matches!(
                dispatcher.register(bad).await,
                Err(DispatchError::InvalidRegistration(_))
            ));
        }
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn affinity_scenario_routes_only_matching_tracks() {
        let (dispatcher, log) = setup();
        dispatcher
            .register(request("a-1", &["eda"], &["cota", "sebring"], 5))
            .await
            .unwrap();

        let placement = dispatcher.submit(task("eda", "road_america")).await.unwrap();
        assert!(matches!(placement, Placement::Backlog { .. }));

        let placement = dispatcher.submit(task("eda", "COTA")).await.unwrap();
        assert!(matches!(placement, Placement::Agent { ref agent_id, .. } if agent_id == "a-1"));

        assert_eq!(log.topic_len(topics::TASK_BACKLOG).await.unwrap(), 1);
        assert_eq!(log.topic_len(&topics::agent_tasks("a-1")).await.unwrap(), 1);
        assert_eq!(dispatcher.registry().get("a-1").unwrap().load, 1);
    }

    #[tokio::test]
    async fn stale_agent_scenario_queues_task() {
        let (dispatcher, _) = setup();
        let registered_at = Utc::now() - chrono::Duration::seconds(35);
        dispatcher
            .register_at(request("a-1", &["eda"], &["*"], 5), registered_at)
            .await
            .unwrap();

        let placement = dispatcher.submit(task("eda", "cota")).await.unwrap();
        assert!(matches!(placement, Placement::Backlog { .. }));
        assert!(dispatcher.registry().get("a-1").is_some());
    }

    #[tokio::test]
    async fn window_fans_out_one_task_per_type() {
        let (dispatcher, log) = setup();
        dispatcher
            .register(request("both", &["eda", "explainer"], &["*"], 10))
            .await
            .unwrap();

        let window = AggregateWindow {
            window_id: "w-1".to_string(),
            track: "cota".to_string(),
            chassis: "c1".to_string(),
            timestamp: Utc::now(),
            point_count: 0,
            sectors: Vec::new(),
            lap_range: crate::types::LapRange { first: 1, last: 1 },
            evidence: Vec::new(),
        };
        let placements = dispatcher.dispatch_window(&window).await.unwrap();
        assert_eq!(placements.len(), 2);

        log.ensure_group(&topics::agent_tasks("both"), "g").await.unwrap();
        let entries = log
            .read_group(&topics::agent_tasks("both"), "g", "c", ReadFrom::New, 10, Duration::ZERO)
            .await
            .unwrap();
        let types: Vec<String> = entries
            .iter()
            .map(|e| e.decode::<AgentTask>().unwrap().task_type)
            .collect();
        assert_eq!(types, vec!["eda", "explainer"]);
    }

    #[tokio::test]
    async fn backlog_router_places_task_once_agent_appears() {
        let (dispatcher, log) = setup();
        dispatcher.submit(task("eda", "vir")).await.unwrap();

        let router = Arc::new(BacklogRouter::new(Arc::clone(&dispatcher)));
        let entry = LogEntry {
            id: EntryId(1),
            payload: serde_json::to_vec(&task("eda", "vir")).unwrap(),
            delivery_count: 1,
        };
        let err = router.handle(entry.decode().unwrap(), &entry).await.unwrap_err();
        assert!(err.is::<Deferred>());

        dispatcher
            .register(request("late", &["eda"], &["VIR"], 1))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let consumer = ConsumerLoop::new(
            Arc::clone(&log) as Arc<dyn StreamLog>,
            router,
            ConsumerOptions::new(topics::TASK_BACKLOG, "dispatcher", "router-1"),
            ConsumerSettings {
                block_ms: 20,
                ..ConsumerSettings::default()
            },
        );
        let handle = tokio::spawn(consumer.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.acked, 1);
        assert_eq!(log.topic_len(&topics::agent_tasks("late")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn backlog_task_outlives_delivery_budget_until_agent_registers() {
        let log = Arc::new(
            SledLog::temporary(&LogConfig::default())
                .unwrap()
                .with_visibility_timeout(Duration::ZERO),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(AgentRegistry::new(Duration::from_secs(30))),
            Arc::clone(&log) as Arc<dyn StreamLog>,
            DispatchConfig::default(),
        ));
        dispatcher.submit(task("eda", "vir")).await.unwrap();

        let settings = ConsumerSettings {
            block_ms: 20,
            max_deliveries: 4,
            ..ConsumerSettings::default()
        };
        let run_router = |duration: Duration| {
            let consumer = ConsumerLoop::new(
                Arc::clone(&log) as Arc<dyn StreamLog>,
                Arc::new(BacklogRouter::new(Arc::clone(&dispatcher))),
                ConsumerOptions::new(topics::TASK_BACKLOG, "dispatch", "relay"),
                settings.clone(),
            );
            async move {
                let cancel = CancellationToken::new();
                let handle = tokio::spawn(consumer.run(cancel.clone()));
                tokio::time::sleep(duration).await;
                cancel.cancel();
                handle.await.unwrap().unwrap()
            }
        };

        let waiting = run_router(Duration::from_millis(300)).await;
        assert!(waiting.deferred > 4);
        assert_eq!(waiting.handler_failures, 0);
        assert_eq!(waiting.dead_lettered, 0);

        dispatcher
            .register(request("late", &["eda"], &["vir"], 1))
            .await
            .unwrap();
        let placed = run_router(Duration::from_millis(300)).await;

        assert_eq!(placed.dead_lettered, 0);
        assert_eq!(log.topic_len(&topics::dead_letter(topics::TASK_BACKLOG)).await.unwrap(), 0);
        assert_eq!(log.topic_len(&topics::agent_tasks("late")).await.unwrap(), 1);
        assert_eq!(log.pending_count(topics::TASK_BACKLOG, "dispatch").unwrap(), 0);
    }

    #[tokio::test]
    async fn settler_releases_load_once_per_task() {
        let registry = Arc::new(AgentRegistry::new(Duration::from_secs(30)));
        let now = Utc::now();
        registry.upsert(build_registration(request("a", &["eda"], &["*"], 4), now).unwrap());
        registry.reserve("a");
        registry.reserve("a");

        let settler = LoadSettler::new(Arc::clone(&registry));
        let result = AgentResult {
            task_id: "t-1".to_string(),
            agent_id: "a".to_string(),
            task_type: "eda".to_string(),
            success: true,
            result: json!({}),
            latency_ms: 3,
            completed_at: now,
        };
        let entry = LogEntry {
            id: EntryId(7),
            payload: Vec::new(),
            delivery_count: 1,
        };
        settler.handle(result.clone(), &entry).await.unwrap();
        settler.handle(result, &entry).await.unwrap();
        assert_eq!(registry.get("a").unwrap().load, 1);
    }

    #[tokio::test]
    async fn registrations_survive_restart_but_need_heartbeat() {
        let (dispatcher, log) = setup();
        let long_ago = Utc::now() - chrono::Duration::minutes(10);
        dispatcher
            .register_at(request("a-1", &["eda"], &["*"], 2), long_ago)
            .await
            .unwrap();

        let fresh = Dispatcher::new(
            Arc::new(AgentRegistry::new(Duration::from_secs(30))),
            log as Arc<dyn StreamLog>,
            DispatchConfig::default(),
        );
        assert_eq!(fresh.restore_registrations().await.unwrap(), 1);
        assert!(matches!(
            fresh.submit(task("eda", "cota")).await.unwrap(),
            Placement::Backlog { .. }
        ));

        assert!(fresh.heartbeat("a-1"));
        assert!(matches!(
            fresh.submit(task("eda", "cota")).await.unwrap(),
            Placement::Agent { .. }
        ));
    }
}
