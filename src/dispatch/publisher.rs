//! Aggregate window publication: the log topic for the broadcast path plus
//! one task per window task type for the agents.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::dispatcher::Dispatcher;
use crate::aggregation::WindowSink;
use crate::stream::{append_json, topics, StreamLog};
use crate::types::AggregateWindow;

pub struct WindowPublisher {
    log: Arc<dyn StreamLog>,
    dispatcher: Arc<Dispatcher>,
}

impl WindowPublisher {
    pub fn new(log: Arc<dyn StreamLog>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { log, dispatcher }
    }
}

#[async_trait]
impl WindowSink for WindowPublisher {
    async fn publish(&self, window: AggregateWindow) -> anyhow::Result<()> {
        append_json(self.log.as_ref(), topics::AGGREGATES, &window).await?;
        let placements = self.dispatcher.dispatch_window(&window).await?;
        debug!(
            window_id = %window.window_id,
            tasks = placements.len(),
            "Window published"
        );
        Ok(())
    }
}
