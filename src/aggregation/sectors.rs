//! Static sector boundaries per track.
//!
//! A boundary list holds the lap distances (metres) at which sectors 2..=n
//! start; sector 1 begins at the start/finish line. An empty list means the
//! whole lap is one sector.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::tracks::normalize_track;

/// Built-in boundaries keyed by canonical track.
const BUILTIN: &[(&str, &[f64])] = &[
    ("barber", &[1_230.0, 2_480.0]),
    ("cota", &[1_650.0, 3_560.0]),
    ("indianapolis", &[1_310.0, 2_640.0]),
    ("road_america", &[2_110.0, 4_340.0]),
    ("sebring", &[1_980.0, 4_050.0]),
    ("sonoma", &[1_290.0, 2_700.0]),
    ("vir", &[1_760.0, 3_520.0]),
];

#[derive(Debug, Clone, Default)]
pub struct SectorMap {
    tracks: HashMap<String, Vec<f64>>,
}

impl SectorMap {
    /// Map with only the built-in tracks.
    pub fn builtin() -> Self {
        let tracks = BUILTIN
            .iter()
            .map(|(track, bounds)| ((*track).to_string(), bounds.to_vec()))
            .collect();
        Self { tracks }
    }

    /// Built-in map with per-track overrides from config. Keys may be any
    /// alias. An invalid override collapses that track to a single sector.
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<f64>>) -> Self {
        let mut map = Self::builtin();
        for (raw_track, bounds) in overrides {
            let track = normalize_track(raw_track);
            if valid_boundaries(bounds) {
                map.tracks.insert(track, bounds.clone());
            } else {
                warn!(
                    track = %track,
                    "Sector boundaries must be finite, positive and strictly increasing; using a single sector"
                );
                map.tracks.insert(track, Vec::new());
            }
        }
        map
    }

    /// Number of sectors for `track` (at least 1).
    pub fn sector_count(&self, track: &str) -> usize {
        self.boundaries(track).len() + 1
    }

    /// 1-based sector containing `lap_distance`. Unknown tracks and
    /// out-of-range distances land in sector 1.
    pub fn sector_for(&self, track: &str, lap_distance: f64) -> u32 {
        if !lap_distance.is_finite() || lap_distance < 0.0 {
            return 1;
        }
        let passed = self
            .boundaries(track)
            .iter()
            .take_while(|b| lap_distance >= **b)
            .count();
        passed as u32 + 1
    }

    fn boundaries(&self, track: &str) -> &[f64] {
        self.tracks.get(track).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Boundaries must be finite, above the start/finish line and strictly
/// increasing. Config validation applies the same rule.
pub fn valid_boundaries(bounds: &[f64]) -> bool {
    bounds.iter().all(|b| b.is_finite() && *b > 0.0) && bounds.windows(2).all(|w| w[0] < w[1])
}
