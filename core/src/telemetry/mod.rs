pub mod events;
pub mod log;
pub mod metrics;

pub use events::PipelineEvent;
pub use log::LogManager;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
