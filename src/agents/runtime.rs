//! In-process agent runtime
//!
//! An [`AgentRuntime`] behaves exactly like an external agent: it registers
//! through the dispatcher, heartbeats on a fixed interval, consumes its own
//! task stream and appends an [`AgentResult`] per task to `results`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::workers::TaskWorker;
use crate::config::ConsumerSettings;
use crate::dispatch::Dispatcher;
use crate::stream::{
    append_json, topics, ConsumerLoop, ConsumerOptions, ConsumerStats, LogEntry, StreamHandler,
    StreamLog,
};
use crate::tracks::WILDCARD;
use crate::types::{AgentResult, AgentTask, RegistrationRequest};

pub struct AgentRuntime {
    agent_id: String,
    worker: Arc<dyn TaskWorker>,
    dispatcher: Arc<Dispatcher>,
    log: Arc<dyn StreamLog>,
    tracks: Vec<String>,
    capacity: u32,
    heartbeat_interval: Duration,
    consumer: ConsumerSettings,
}

impl AgentRuntime {
    pub fn new(
        agent_id: impl Into<String>,
        worker: Arc<dyn TaskWorker>,
        dispatcher: Arc<Dispatcher>,
        log: Arc<dyn StreamLog>,
    ) -> Self {
        let config = crate::config::get();
        Self {
            agent_id: agent_id.into(),
            worker,
            dispatcher,
            log,
            tracks: vec![WILDCARD.to_string()],
            capacity: config.agents.capacity,
            heartbeat_interval: Duration::from_secs(config.registry.heartbeat_interval_secs),
            consumer: config.consumer.clone(),
        }
    }

    pub fn with_tracks(mut self, tracks: Vec<String>) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_consumer_settings(mut self, settings: ConsumerSettings) -> Self {
        self.consumer = settings;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Register, then heartbeat and consume until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<ConsumerStats> {
        self.dispatcher
            .register(RegistrationRequest {
                agent_id: self.agent_id.clone(),
                task_types: vec![self.worker.task_type().to_string()],
                tracks: self.tracks.clone(),
                capacity: self.capacity,
            })
            .await?;

        let heartbeat_cancel = cancel.child_token();
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&self.dispatcher),
            self.agent_id.clone(),
            self.heartbeat_interval,
            heartbeat_cancel.clone(),
        ));

        let topic = topics::agent_tasks(&self.agent_id);
        let handler = Arc::new(TaskHandler {
            agent_id: self.agent_id.clone(),
            worker: Arc::clone(&self.worker),
            log: Arc::clone(&self.log),
        });
        let consumer = ConsumerLoop::new(
            Arc::clone(&self.log),
            handler,
            ConsumerOptions::new(&topic, format!("agent.{}", self.agent_id), self.agent_id.clone()),
            self.consumer.clone(),
        );

        info!(agent_id = %self.agent_id, task_type = self.worker.task_type(), "Agent running");
        let result = consumer.run(cancel).await;

        heartbeat_cancel.cancel();
        join_heartbeat(&self.agent_id, heartbeat).await;
        Ok(result?)
    }
}

/// Wait for the heartbeat task. Returns false if it panicked or was aborted.
async fn join_heartbeat(agent_id: &str, heartbeat: JoinHandle<()>) -> bool {
    match heartbeat.await {
        Ok(()) => true,
        Err(e) => {
            error!(agent_id, "[Agent] Heartbeat task panicked: {}", e);
            false
        }
    }
}

async fn heartbeat_loop(
    dispatcher: Arc<Dispatcher>,
    agent_id: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !dispatcher.heartbeat(&agent_id) {
                    warn!(agent_id = %agent_id, "Heartbeat rejected: agent not registered");
                }
            }
        }
    }
}

/// Runs a worker over one agent's task stream.
pub struct TaskHandler {
    agent_id: String,
    worker: Arc<dyn TaskWorker>,
    log: Arc<dyn StreamLog>,
}

impl TaskHandler {
    async fn publish(
        &self,
        task: &AgentTask,
        success: bool,
        result: serde_json::Value,
        started: Instant,
    ) -> anyhow::Result<()> {
        let envelope = AgentResult {
            task_id: task.task_id.clone(),
            agent_id: self.agent_id.clone(),
            task_type: task.task_type.clone(),
            success,
            result,
            latency_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        };
        append_json(self.log.as_ref(), topics::RESULTS, &envelope).await?;
        Ok(())
    }
}

#[async_trait]
impl StreamHandler for TaskHandler {
    type Item = AgentTask;

    async fn handle(&self, mut task: AgentTask, entry: &LogEntry) -> anyhow::Result<()> {
        let started = Instant::now();
        task.attempt = entry.delivery_count;

        if task.attempt > task.max_attempts {
            warn!(task_id = %task.task_id, attempt = task.attempt, "Task out of attempts");
            return self
                .publish(
                    &task,
                    false,
                    serde_json::json!({"error": "max attempts exceeded", "attempts": task.max_attempts}),
                    started,
                )
                .await;
        }

        if task.task_type != self.worker.task_type() {
            return self
                .publish(
                    &task,
                    false,
                    serde_json::json!({"error": format!("unsupported task type {}", task.task_type)}),
                    started,
                )
                .await;
        }

        match self.worker.process(&task) {
            Ok(value) => {
                debug!(task_id = %task.task_id, agent_id = %self.agent_id, "Task complete");
                self.publish(&task, true, value, started).await
            }
            Err(e) if task.attempt >= task.max_attempts => {
                warn!(task_id = %task.task_id, error = %e, "Task failed on final attempt");
                self.publish(&task, false, serde_json::json!({"error": e.to_string()}), started)
                    .await
            }
            // left un-acked for another attempt
            Err(e) => Err(e),
        }
    }
}
