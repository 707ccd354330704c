//! Windowed aggregation of buffered telemetry into per-sector statistics.

pub mod aggregator;
pub mod sectors;

pub use aggregator::{run_aggregator, WindowAggregator, WindowSink};
pub use sectors::SectorMap;
