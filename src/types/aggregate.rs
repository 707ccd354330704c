//! Aggregate windows produced by the windowed aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TelemetrySample;

/// Statistics for one sector of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStats {
    /// 1-based sector number.
    pub sector: u32,
    pub avg_speed: f64,
    /// Largest absolute lateral acceleration seen (g).
    pub max_lateral_g: f64,
    /// Mean tire-stress proxy.
    pub tire_stress: f64,
    pub samples: usize,
}

/// Lap numbers covered by a window (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapRange {
    pub first: u32,
    pub last: u32,
}

/// Derived per-sector summary of one car over one aggregation cycle.
///
/// Created once per cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub window_id: String,
    pub track: String,
    pub chassis: String,
    pub timestamp: DateTime<Utc>,
    pub point_count: usize,
    pub sectors: Vec<SectorStats>,
    pub lap_range: LapRange,
    /// Bounded sample of raw points backing the statistics.
    pub evidence: Vec<TelemetrySample>,
}

impl AggregateWindow {
    /// Mean tire-stress proxy across sectors, weighted by sample count.
    pub fn mean_tire_stress(&self) -> f64 {
        let total: usize = self.sectors.iter().map(|s| s.samples).sum();
        if total == 0 {
            return 0.0;
        }
        self.sectors
            .iter()
            .map(|s| s.tire_stress * s.samples as f64)
            .sum::<f64>()
            / total as f64
    }
}
