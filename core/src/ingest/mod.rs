pub mod header;
pub mod loader;
pub mod sidecar;

pub use header::{scan_header, Channel, HeaderMap, ScanMode};
pub use loader::{ChannelTable, PassData, TemperatureSeries};
pub use sidecar::{file_id, ConvertedFiles};
