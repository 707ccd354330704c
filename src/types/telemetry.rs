//! Telemetry sample as received from the car.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One vehicle-state reading.
///
/// `track` always holds the canonical key produced by
/// [`crate::tracks::normalize_track`]. Accelerations are in g, speed in km/h,
/// `lap_distance` in metres from the start/finish line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub track: String,
    pub chassis: String,
    pub lap: u32,
    pub lap_distance: f64,
    pub speed: f64,
    /// Longitudinal acceleration (g).
    pub accel_x: f64,
    /// Lateral acceleration (g).
    pub accel_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steering_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brake_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<f64>,
    /// Slip estimate supplied by the logger, when it computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slip: Option<f64>,
    /// Tire stress supplied by the logger, when it computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tire_stress: Option<f64>,
}

impl TelemetrySample {
    /// Combined acceleration magnitude (g).
    pub fn combined_g(&self) -> f64 {
        self.accel_x.hypot(self.accel_y)
    }

    /// Tire-stress proxy: the logger's value when present, otherwise
    /// combined g scaled by speed (load rises with both).
    pub fn tire_stress_proxy(&self) -> f64 {
        self.tire_stress
            .unwrap_or_else(|| self.combined_g() * (self.speed.max(0.0) / 100.0))
    }
}
