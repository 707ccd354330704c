//! Exploratory sector ranking.

use super::{window_payload, TaskWorker};
use crate::types::{task_type, AgentTask, EdaOutput};

pub struct EdaWorker;

impl TaskWorker for EdaWorker {
    fn task_type(&self) -> &'static str {
        task_type::EDA
    }

    fn process(&self, task: &AgentTask) -> anyhow::Result<serde_json::Value> {
        let window = window_payload(task)?;
        let sectors = &window.sectors;

        let by_speed = |a: &&crate::types::SectorStats, b: &&crate::types::SectorStats| {
            a.avg_speed.total_cmp(&b.avg_speed)
        };
        let fastest = sectors.iter().max_by(by_speed);
        let slowest = sectors.iter().min_by(by_speed);
        let peak_lateral = sectors
            .iter()
            .max_by(|a, b| a.max_lateral_g.total_cmp(&b.max_lateral_g));

        let (Some(fastest), Some(slowest), Some(peak_lateral)) = (fastest, slowest, peak_lateral)
        else {
            anyhow::bail!("window {} has no sectors", window.window_id);
        };

        let output = EdaOutput {
            window_id: window.window_id.clone(),
            track: window.track.clone(),
            chassis: window.chassis.clone(),
            fastest_sector: fastest.sector,
            slowest_sector: slowest.sector,
            peak_lateral_sector: peak_lateral.sector,
            peak_lateral_g: peak_lateral.max_lateral_g,
            speed_spread: fastest.avg_speed - slowest.avg_speed,
            sectors_analyzed: sectors.len(),
        };
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{sector, task, window};
    use super::*;

    #[test]
    fn ranks_sectors() {
        let window = window(vec![
            sector(1, 180.0, 1.1, 2.0),
            sector(2, 95.0, 2.4, 3.1),
            sector(3, 150.0, 1.8, 2.2),
        ]);
        let value = EdaWorker.process(&task("eda", &window)).unwrap();
        let out: EdaOutput = serde_json::from_value(value).unwrap();

        assert_eq!(out.fastest_sector, 1);
        assert_eq!(out.slowest_sector, 2);
        assert_eq!(out.peak_lateral_sector, 2);
        assert!((out.speed_spread - 85.0).abs() < 1e-9);
        assert_eq!(out.sectors_analyzed, 3);
    }

    #[test]
    fn rejects_payload_that_is_not_a_window() {
        let mut t = task("eda", &window(vec![sector(1, 100.0, 1.0, 1.0)]));
        t.payload = serde_json::json!({"unexpected": true});
        assert!(EdaWorker.process(&t).is_err());
    }
}
