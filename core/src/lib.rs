//! Processing core for the automated Long-Trace-Profiler metrology pipeline.
//!
//! Raw scans are converted to ascii, their autocollimator channels averaged
//! over repeated passes, composed into a slope profile and integrated into
//! height. A flat or elliptical target shape is then fitted and the residual
//! reported as slope and height error.

pub mod ingest;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use pipeline::{IngestionLoop, PollSettings};
pub use prelude::{MirrorFitter, MirrorParameters, PipelineError, PipelineResult, SlopeProfile};
pub use telemetry::PipelineEvent;
