pub mod metrics;

pub use metrics::{LoopMetrics, MetricsSnapshot};
