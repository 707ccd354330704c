//! Tire-load explainer
//!
//! Flags the sector whose tire-stress proxy stands out most against the
//! window mean and renders a human-facing insight for it.
//!
//! | stress / mean | severity |
//! |---|---|
//! | >= 2.0 | critical |
//! | >= 1.5 | high |
//! | >= 1.2 | medium |
//! | otherwise | low |

use super::{window_payload, TaskWorker};
use crate::types::{task_type, AgentTask, ExplainerOutput, Severity};

const CRITICAL_RATIO: f64 = 2.0;
const HIGH_RATIO: f64 = 1.5;
const MEDIUM_RATIO: f64 = 1.2;

pub struct ExplainerWorker;

fn severity_for(ratio: f64) -> Severity {
    if ratio >= CRITICAL_RATIO {
        Severity::Critical
    } else if ratio >= HIGH_RATIO {
        Severity::High
    } else if ratio >= MEDIUM_RATIO {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// 0 at the mean, 100 at twice the mean or more.
fn score_for(ratio: f64) -> f64 {
    ((ratio - 1.0) * 100.0).clamp(0.0, 100.0)
}

fn recommendation(severity: Severity, sector: u32) -> String {
    match severity {
        Severity::Critical => format!(
            "Check tire temperatures and pressures now; sector {sector} is overloading the tires."
        ),
        Severity::High => format!(
            "Review entry speed and steering input through sector {sector} to spread the load."
        ),
        Severity::Medium => format!("Watch tire wear trend in sector {sector} over the next laps."),
        Severity::Low => "Tire load is evenly distributed; no action needed.".to_string(),
    }
}

impl TaskWorker for ExplainerWorker {
    fn task_type(&self) -> &'static str {
        task_type::EXPLAINER
    }

    fn process(&self, task: &AgentTask) -> anyhow::Result<serde_json::Value> {
        let window = window_payload(task)?;
        let mean = window.mean_tire_stress();

        let Some(hot) = window
            .sectors
            .iter()
            .max_by(|a, b| a.tire_stress.total_cmp(&b.tire_stress))
        else {
            anyhow::bail!("window {} has no sectors", window.window_id);
        };

        let ratio = if mean > f64::EPSILON {
            hot.tire_stress / mean
        } else {
            1.0
        };
        let severity = severity_for(ratio);

        let output = ExplainerOutput {
            title: format!("Tire load peaks in sector {} ({})", hot.sector, window.chassis),
            severity,
            score: score_for(ratio),
            explanation: format!(
                "Sector {} averaged a tire-stress proxy of {:.2}, {:.0}% of the window mean ({:.2}) \
                 over {} samples on laps {}-{}. Peak lateral load there was {:.2} g at {:.0} km/h average.",
                hot.sector,
                hot.tire_stress,
                ratio * 100.0,
                mean,
                hot.samples,
                window.lap_range.first,
                window.lap_range.last,
                hot.max_lateral_g,
                hot.avg_speed,
            ),
            evidence: window.evidence.clone(),
            recommendation: recommendation(severity, hot.sector),
            track: window.track.clone(),
            chassis: window.chassis.clone(),
        };
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{sector, task, window};
    use super::*;

    fn explain(sectors: Vec<crate::types::SectorStats>) -> ExplainerOutput {
        let value = ExplainerWorker
            .process(&task("explainer", &window(sectors)))
            .unwrap();
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn hot_sector_is_flagged() {
        let out = explain(vec![
            sector(1, 170.0, 1.0, 1.0),
            sector(2, 90.0, 2.2, 4.0),
            sector(3, 160.0, 1.2, 1.0),
        ]);
        // mean 2.0, ratio 2.0
        assert_eq!(out.severity, Severity::Critical);
        assert!((out.score - 100.0).abs() < 1e-9);
        assert!(out.title.contains("sector 2"));
        assert_eq!(out.track, "cota");
    }

    #[test]
    fn even_load_is_low() {
        let out = explain(vec![sector(1, 150.0, 1.0, 2.0), sector(2, 140.0, 1.1, 2.1)]);
        assert_eq!(out.severity, Severity::Low);
        assert!(out.score < 10.0);
    }

    #[test]
    fn thresholds() {
        assert_eq!(severity_for(1.19), Severity::Low);
        assert_eq!(severity_for(1.2), Severity::Medium);
        assert_eq!(severity_for(1.5), Severity::High);
        assert_eq!(severity_for(2.5), Severity::Critical);
        assert_eq!(score_for(0.5), 0.0);
    }

    #[test]
    fn zero_stress_window_does_not_divide_by_zero() {
        let out = explain(vec![sector(1, 0.0, 0.0, 0.0)]);
        assert_eq!(out.severity, Severity::Low);
        assert_eq!(out.score, 0.0);
    }
}
