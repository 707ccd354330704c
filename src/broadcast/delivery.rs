//! Log consumers that feed the fan-out hub.
//!
//! The delivery side is an ordinary peer of the durable log: it owns its
//! own consumer groups on `results` and `telemetry.aggregates` and never
//! receives anything from the dispatcher in process.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{FanoutHub, InsightCache};
use crate::acquisition::TelemetryBatcher;
use crate::stream::{LogEntry, StreamHandler};
use crate::types::{AgentResult, AggregateWindow, BroadcastMessage, Insight, ResultPayload, TelemetrySample};

/// Turns agent results into `insight_update` / `eda_update` messages.
pub struct ResultDelivery {
    hub: Arc<FanoutHub>,
    cache: Arc<InsightCache>,
}

impl ResultDelivery {
    pub fn new(hub: Arc<FanoutHub>, cache: Arc<InsightCache>) -> Self {
        Self { hub, cache }
    }
}

#[async_trait]
impl StreamHandler for ResultDelivery {
    type Item = AgentResult;

    async fn handle(&self, result: AgentResult, entry: &LogEntry) -> anyhow::Result<()> {
        if !result.success {
            info!(
                task_id = %result.task_id,
                agent_id = %result.agent_id,
                task_type = %result.task_type,
                error = %result.result.get("error").and_then(|e| e.as_str()).unwrap_or("unknown"),
                "Agent reported failed task"
            );
            return Ok(());
        }

        let message = match result.payload() {
            Ok(ResultPayload::Explainer(output)) => {
                let insight = Insight::from_explainer(&result, output);
                self.cache.insert(insight.clone());
                BroadcastMessage::InsightUpdate { insight }
            }
            Ok(ResultPayload::Eda(summary)) => BroadcastMessage::EdaUpdate {
                task_id: result.task_id.clone(),
                agent_id: result.agent_id.clone(),
                summary,
            },
            Ok(ResultPayload::Unknown { task_type }) => {
                debug!(task_id = %result.task_id, task_type = %task_type, "No renderer for result type");
                return Ok(());
            }
            Err(e) => {
                // malformed nested result, drop this entry only
                warn!(
                    entry = %entry.id,
                    task_id = %result.task_id,
                    task_type = %result.task_type,
                    error = %e,
                    "Result payload does not match its task type"
                );
                return Ok(());
            }
        };

        let report = self.hub.broadcast(&message);
        debug!(kind = message.kind(), delivered = report.delivered, "Result broadcast");
        Ok(())
    }
}

/// Turns aggregate windows into `aggregate_update` messages.
pub struct AggregateDelivery {
    hub: Arc<FanoutHub>,
}

impl AggregateDelivery {
    pub fn new(hub: Arc<FanoutHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl StreamHandler for AggregateDelivery {
    type Item = AggregateWindow;

    async fn handle(&self, window: AggregateWindow, _entry: &LogEntry) -> anyhow::Result<()> {
        self.hub.broadcast(&BroadcastMessage::AggregateUpdate { window });
        Ok(())
    }
}

/// Batch raw samples from the listener into `telemetry_update` messages.
///
/// Runs until cancelled or until the listener side of the channel closes;
/// whatever is pending at that point is flushed once.
pub async fn pump_raw_telemetry(
    mut rx: mpsc::Receiver<TelemetrySample>,
    mut batcher: TelemetryBatcher,
    hub: Arc<FanoutHub>,
    cancel: CancellationToken,
) {
    let send = |points: Vec<TelemetrySample>| {
        hub.broadcast(&BroadcastMessage::TelemetryUpdate { points });
    };

    loop {
        let deadline = batcher.deadline();
        tokio::select! {
            _ = cancel.cancelled() => break,
            sample = rx.recv() => match sample {
                Some(sample) => {
                    if let Some(batch) = batcher.push(sample, Instant::now()) {
                        send(batch);
                    }
                }
                None => break,
            },
            _ = sleep_until(deadline), if deadline.is_some() => {
                if let Some(batch) = batcher.poll(Instant::now()) {
                    send(batch);
                }
            }
        }
    }

    if let Some(batch) = batcher.flush() {
        send(batch);
    }
    info!("[Broadcast] Raw telemetry pump stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
