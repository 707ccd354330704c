//! Task supervision
//!
//! Every long-running unit is spawned into one `JoinSet`. The first unit
//! that fails (or panics) cancels all others and its error is returned, so
//! the process exits non-zero and an outer supervisor can restart it.

use std::fmt;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    HttpServer,
    TelemetryListener,
    Aggregator,
    RawTelemetryPump,
    AggregateDelivery,
    ResultDelivery,
    BacklogRouter,
    LoadSettler,
    Agent,
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HttpServer => "HttpServer",
            Self::TelemetryListener => "TelemetryListener",
            Self::Aggregator => "Aggregator",
            Self::RawTelemetryPump => "RawTelemetryPump",
            Self::AggregateDelivery => "AggregateDelivery",
            Self::ResultDelivery => "ResultDelivery",
            Self::BacklogRouter => "BacklogRouter",
            Self::LoadSettler => "LoadSettler",
            Self::Agent => "Agent",
        };
        f.write_str(name)
    }
}

/// Monitor tasks until shutdown, all tasks finished, or the first failure.
pub async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel: CancellationToken,
) -> Result<()> {
    info!(tasks = task_set.len(), "[Supervisor] All tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[Supervisor] Shutdown signal received");
                break;
            }
            result = task_set.join_next() => match result {
                Some(Ok(Ok(task))) => {
                    info!("[Supervisor] Task {} completed normally", task);
                }
                Some(Ok(Err(e))) => {
                    error!("[Supervisor] Task failed: {:#}", e);
                    cancel.cancel();
                    return Err(e);
                }
                Some(Err(e)) => {
                    error!("[Supervisor] Task panicked: {}", e);
                    cancel.cancel();
                    return Err(anyhow::anyhow!("task panicked: {e}"));
                }
                None => {
                    info!("[Supervisor] All tasks completed");
                    break;
                }
            },
        }
    }

    Ok(())
}

/// Wait for the remaining tasks after cancellation, logging failures.
pub async fn drain(task_set: &mut JoinSet<Result<TaskName>>) {
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task)) => info!("[Supervisor] Task {} stopped", task),
            Ok(Err(e)) => error!("[Supervisor] Task failed during shutdown: {:#}", e),
            Err(e) => error!("[Supervisor] Task panicked during shutdown: {}", e),
        }
    }
}
