//! Raw-update batching
//!
//! Samples forwarded by the listener are grouped before they are broadcast:
//! a batch is flushed when it reaches `max_points` or when its oldest
//! sample has waited `max_age`, whichever comes first.

use std::time::{Duration, Instant};

use crate::config::IngestConfig;
use crate::types::TelemetrySample;

pub struct TelemetryBatcher {
    max_points: usize,
    max_age: Duration,
    pending: Vec<TelemetrySample>,
    /// When the first sample of the pending batch arrived.
    opened_at: Option<Instant>,
}

impl TelemetryBatcher {
    pub fn new(max_points: usize, max_age: Duration) -> Self {
        let max_points = max_points.max(1);
        Self {
            max_points,
            max_age,
            pending: Vec::with_capacity(max_points),
            opened_at: None,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.batch_max_points, config.batch_max_age())
    }

    /// Add a sample. Returns a full batch when the count threshold is hit.
    pub fn push(&mut self, sample: TelemetrySample, now: Instant) -> Option<Vec<TelemetrySample>> {
        if self.pending.is_empty() {
            self.opened_at = Some(now);
        }
        self.pending.push(sample);
        if self.pending.len() >= self.max_points {
            return self.take();
        }
        None
    }

    /// Flush the pending batch if it has aged out.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<TelemetrySample>> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.take(),
            _ => None,
        }
    }

    /// Flush whatever is pending, regardless of thresholds.
    pub fn flush(&mut self) -> Option<Vec<TelemetrySample>> {
        self.take()
    }

    /// When the pending batch must be flushed, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.opened_at.map(|at| at + self.max_age)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self) -> Option<Vec<TelemetrySample>> {
        self.opened_at = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.max_points),
        ))
    }
}
