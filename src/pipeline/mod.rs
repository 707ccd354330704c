//! Relay assembly
//!
//! ```text
//! UDP ─► TelemetryListener ─► SharedRing ─► Aggregator ─► telemetry.aggregates ─► AggregateDelivery ─┐
//!              │                                 │                                                     │
//!              └─► raw channel ─► RawTelemetryPump ─────────────────────────────────────────────────► FanoutHub ─► /ws
//!                                                └─► Dispatcher ─► tasks.agent.<id> ─► agents ─► results ─► ResultDelivery
//!                                                       │                                        └─► LoadSettler
//!                                                       └─► tasks.backlog ─► BacklogRouter
//! ```
//!
//! [`Relay`] owns the shared components; [`Relay::start`] spawns every
//! long-running unit into the supervisor's `JoinSet`.

pub mod supervisor;

pub use supervisor::{drain, run_supervisor, TaskName};

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acquisition::{channel_callback, IngestStats, SharedRing, TelemetryBatcher, TelemetryListener};
use crate::agents::{default_workers, AgentRuntime, TaskWorker};
use crate::aggregation::{run_aggregator, SectorMap, WindowAggregator};
use crate::api::ApiState;
use crate::broadcast::{pump_raw_telemetry, AggregateDelivery, FanoutHub, InsightCache, ResultDelivery};
use crate::config::RelayConfig;
use crate::dispatch::{AgentRegistry, BacklogRouter, Dispatcher, LoadSettler, WindowPublisher};
use crate::stream::{topics, ConsumerLoop, ConsumerOptions, StreamHandler, StreamLog};
use crate::types::TelemetrySample;

/// Consumer group of the broadcast side on `results` and `telemetry.aggregates`.
pub const BROADCAST_GROUP: &str = "broadcast";
/// Consumer group of the backlog router.
pub const DISPATCH_GROUP: &str = "dispatch";
/// Consumer group of the load settler on `results`.
pub const SETTLE_GROUP: &str = "dispatch.settle";
/// Consumer name used by every relay-side consumer.
pub const RELAY_CONSUMER: &str = "relay";

/// What a started relay exposes to its caller.
pub struct RelayHandle {
    pub api: ApiState,
    pub udp_addr: SocketAddr,
}

pub struct Relay {
    config: RelayConfig,
    log: Arc<dyn StreamLog>,
    ring: SharedRing<TelemetrySample>,
    ingest: Arc<IngestStats>,
    dispatcher: Arc<Dispatcher>,
    hub: Arc<FanoutHub>,
    insights: Arc<InsightCache>,
}

impl Relay {
    pub fn new(config: RelayConfig, log: Arc<dyn StreamLog>) -> Self {
        let registry = Arc::new(AgentRegistry::new(Duration::from_secs(
            config.registry.heartbeat_timeout_secs,
        )));
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::clone(&log),
            config.dispatch.clone(),
        ));

        Self {
            ring: SharedRing::new(config.ingest.buffer_capacity),
            ingest: Arc::new(IngestStats::default()),
            hub: Arc::new(FanoutHub::new(config.broadcast.max_buffered_bytes)),
            insights: Arc::new(InsightCache::new(config.broadcast.insight_cache_capacity)),
            dispatcher,
            log,
            config,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    /// Bind the UDP socket and spawn every unit into `task_set`.
    ///
    /// Binding happens before anything is spawned so a bad address fails
    /// startup instead of a running task.
    pub async fn start(
        &self,
        task_set: &mut JoinSet<Result<TaskName>>,
        cancel: &CancellationToken,
    ) -> Result<RelayHandle> {
        if let Err(e) = self.dispatcher.restore_registrations().await {
            warn!(error = %e, "Could not restore agent registrations");
        }

        // Raw updates: listener callback -> bounded channel -> batcher.
        let (raw_tx, raw_rx) = mpsc::channel(self.config.ingest.raw_channel_capacity.max(1));
        let listener = TelemetryListener::bind(&self.config.ingest, self.ring.clone(), Arc::clone(&self.ingest))?
            .with_callback(channel_callback(raw_tx, Arc::clone(&self.ingest)));
        let udp_addr = listener.local_addr()?;

        let token = cancel.clone();
        task_set.spawn(async move {
            listener.run(token).await;
            Ok(TaskName::TelemetryListener)
        });

        let batcher = TelemetryBatcher::from_config(&self.config.ingest);
        let hub = Arc::clone(&self.hub);
        let token = cancel.clone();
        task_set.spawn(async move {
            pump_raw_telemetry(raw_rx, batcher, hub, token).await;
            Ok(TaskName::RawTelemetryPump)
        });

        // Aggregation off the receive path.
        let aggregator = Arc::new(WindowAggregator::new(
            SectorMap::with_overrides(&self.config.sectors),
            self.config.aggregation.evidence_points,
        ));
        let sink = Arc::new(WindowPublisher::new(Arc::clone(&self.log), Arc::clone(&self.dispatcher)));
        let ring = self.ring.clone();
        let aggregation = self.config.aggregation.clone();
        let token = cancel.clone();
        task_set.spawn(async move {
            run_aggregator(ring, aggregator, sink, aggregation, token).await?;
            Ok(TaskName::Aggregator)
        });

        // Relay-side peers of the log.
        let mut consumers = BTreeMap::new();
        self.spawn_consumer(
            task_set,
            &mut consumers,
            TaskName::AggregateDelivery,
            AggregateDelivery::new(Arc::clone(&self.hub)),
            ConsumerOptions::new(topics::AGGREGATES, BROADCAST_GROUP, RELAY_CONSUMER),
            cancel,
        );
        self.spawn_consumer(
            task_set,
            &mut consumers,
            TaskName::ResultDelivery,
            ResultDelivery::new(Arc::clone(&self.hub), Arc::clone(&self.insights)),
            ConsumerOptions::new(topics::RESULTS, BROADCAST_GROUP, RELAY_CONSUMER),
            cancel,
        );
        self.spawn_consumer(
            task_set,
            &mut consumers,
            TaskName::BacklogRouter,
            BacklogRouter::new(Arc::clone(&self.dispatcher)),
            ConsumerOptions::new(topics::TASK_BACKLOG, DISPATCH_GROUP, RELAY_CONSUMER),
            cancel,
        );
        self.spawn_consumer(
            task_set,
            &mut consumers,
            TaskName::LoadSettler,
            LoadSettler::new(Arc::clone(self.dispatcher.registry())),
            ConsumerOptions::new(topics::RESULTS, SETTLE_GROUP, RELAY_CONSUMER),
            cancel,
        );

        if self.config.agents.builtin {
            for worker in default_workers() {
                self.spawn_agent(task_set, Arc::from(worker), cancel);
            }
        }

        info!(udp = %udp_addr, consumers = consumers.len(), "Relay started");

        Ok(RelayHandle {
            api: ApiState {
                dispatcher: Arc::clone(&self.dispatcher),
                hub: Arc::clone(&self.hub),
                insights: Arc::clone(&self.insights),
                ring: self.ring.clone(),
                ingest: Arc::clone(&self.ingest),
                consumers: Arc::new(consumers),
                started_at: Instant::now(),
            },
            udp_addr,
        })
    }

    fn spawn_consumer<H: StreamHandler>(
        &self,
        task_set: &mut JoinSet<Result<TaskName>>,
        states: &mut BTreeMap<String, tokio::sync::watch::Receiver<crate::stream::ConsumerState>>,
        name: TaskName,
        handler: H,
        options: ConsumerOptions,
        cancel: &CancellationToken,
    ) {
        let consumer = ConsumerLoop::new(
            Arc::clone(&self.log),
            Arc::new(handler),
            options,
            self.config.consumer.clone(),
        );
        states.insert(name.to_string(), consumer.state());

        let token = cancel.clone();
        task_set.spawn(async move {
            info!("[{}] Task starting", name);
            let stats = consumer.run(token).await?;
            info!(handled = stats.handled, acked = stats.acked, "[{}] Stopped", name);
            Ok(name)
        });
    }

    fn spawn_agent(
        &self,
        task_set: &mut JoinSet<Result<TaskName>>,
        worker: Arc<dyn TaskWorker>,
        cancel: &CancellationToken,
    ) {
        let runtime = AgentRuntime::new(
            format!("builtin-{}", worker.task_type()),
            worker,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.log),
        )
        .with_capacity(self.config.agents.capacity)
        .with_heartbeat_interval(Duration::from_secs(self.config.registry.heartbeat_interval_secs.max(1)))
        .with_consumer_settings(self.config.consumer.clone());

        let token = cancel.clone();
        task_set.spawn(async move {
            runtime.run(token).await?;
            Ok(TaskName::Agent)
        });
    }
}
