pub mod collaborators;
pub mod ingestion;
pub mod watcher;

pub use collaborators::{AsciiConverter, BusyOracle, NeverBusy, ResultBundle, ResultsSink};
pub use ingestion::{IngestionLoop, IngestionState};
pub use watcher::{discover_new_files, PollSettings};
