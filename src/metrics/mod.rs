pub mod percentiles;
pub mod recorder;
pub mod reservoir;
pub mod snapshot;

pub use percentiles::PercentileSet;
pub use recorder::{LatencyRecorder, RecorderSummary};
