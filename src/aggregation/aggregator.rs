//! Windowed aggregation
//!
//! Every tick the worker snapshots the most recent samples from the ring,
//! computes per-sector statistics for each (track, chassis) pair present and
//! publishes the resulting windows. The computation runs on the blocking
//! pool so a slow pass delays insights, never packet reception.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sectors::SectorMap;
use crate::acquisition::SharedRing;
use crate::config::AggregationConfig;
use crate::types::{AggregateWindow, LapRange, SectorStats, TelemetrySample};

/// Destination for finished windows.
#[async_trait]
pub trait WindowSink: Send + Sync {
    async fn publish(&self, window: AggregateWindow) -> anyhow::Result<()>;
}

/// Pure per-sector statistics over a snapshot.
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    sectors: SectorMap,
    evidence_points: usize,
}

#[derive(Default)]
struct SectorBucket {
    speeds: Vec<f64>,
    lateral: Vec<f64>,
    stress: Vec<f64>,
}

impl WindowAggregator {
    pub fn new(sectors: SectorMap, evidence_points: usize) -> Self {
        Self {
            sectors,
            evidence_points,
        }
    }

    /// One window per (track, chassis) pair in `samples`. Empty input yields
    /// no windows.
    pub fn aggregate(&self, samples: &[TelemetrySample], now: DateTime<Utc>) -> Vec<AggregateWindow> {
        let mut groups: BTreeMap<(&str, &str), Vec<&TelemetrySample>> = BTreeMap::new();
        for sample in samples {
            groups
                .entry((sample.track.as_str(), sample.chassis.as_str()))
                .or_default()
                .push(sample);
        }

        groups
            .into_iter()
            .map(|((track, chassis), points)| self.window(track, chassis, &points, now))
            .collect()
    }

    fn window(
        &self,
        track: &str,
        chassis: &str,
        points: &[&TelemetrySample],
        now: DateTime<Utc>,
    ) -> AggregateWindow {
        let mut buckets: BTreeMap<u32, SectorBucket> = BTreeMap::new();
        let mut first_lap = u32::MAX;
        let mut last_lap = 0;

        for p in points {
            let bucket = buckets
                .entry(self.sectors.sector_for(track, p.lap_distance))
                .or_default();
            bucket.speeds.push(p.speed);
            bucket.lateral.push(p.accel_y);
            bucket.stress.push(p.tire_stress_proxy());
            first_lap = first_lap.min(p.lap);
            last_lap = last_lap.max(p.lap);
        }

        let sectors = buckets
            .into_iter()
            .map(|(sector, b)| SectorStats {
                sector,
                avg_speed: b.speeds.iter().mean(),
                max_lateral_g: b.lateral.iter().abs_max(),
                tire_stress: b.stress.iter().mean(),
                samples: b.speeds.len(),
            })
            .collect();

        AggregateWindow {
            window_id: format!("win-{track}-{chassis}-{}", now.timestamp_millis()),
            track: track.to_string(),
            chassis: chassis.to_string(),
            timestamp: now,
            point_count: points.len(),
            sectors,
            lap_range: LapRange {
                first: first_lap,
                last: last_lap,
            },
            evidence: self.evidence(points),
        }
    }

    /// Evenly strided subset of at most `evidence_points` samples, always
    /// including the newest one.
    fn evidence(&self, points: &[&TelemetrySample]) -> Vec<TelemetrySample> {
        if self.evidence_points == 0 || points.is_empty() {
            return Vec::new();
        }
        let stride = points.len().div_ceil(self.evidence_points);
        let mut picked: Vec<TelemetrySample> = points
            .iter()
            .rev()
            .step_by(stride)
            .take(self.evidence_points)
            .map(|p| (*p).clone())
            .collect();
        picked.reverse();
        picked
    }
}

/// Run the aggregation worker until cancelled.
///
/// A cycle is skipped when the ring is empty or nothing was pushed since
/// the previous cycle.
pub async fn run_aggregator(
    ring: SharedRing<TelemetrySample>,
    aggregator: Arc<WindowAggregator>,
    sink: Arc<dyn WindowSink>,
    config: AggregationConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_seen_total: u64 = 0;

    info!(
        tick_ms = config.tick_ms,
        snapshot_points = config.snapshot_points,
        "[Aggregator] Started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let (snapshot, total) = ring.snapshot_with_count(config.snapshot_points);
        if snapshot.is_empty() || total == last_seen_total {
            continue;
        }
        last_seen_total = total;

        let worker = Arc::clone(&aggregator);
        let windows =
            tokio::task::spawn_blocking(move || worker.aggregate(&snapshot, Utc::now())).await?;

        debug!(windows = windows.len(), "[Aggregator] Cycle complete");
        for window in windows {
            let window_id = window.window_id.clone();
            if let Err(e) = sink.publish(window).await {
                warn!(window_id = %window_id, error = %e, "[Aggregator] Failed to publish window");
            }
        }
    }

    info!("[Aggregator] Stopped");
    Ok(())
}
