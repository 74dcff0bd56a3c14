use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Severity attached to a forwarded log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Everything the ingestion loop tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The loop started watching `watch_dir`.
    Begin { watch_dir: PathBuf },
    /// Processing of a new raw file started.
    FileStarted { file: PathBuf },
    /// A polling cycle finished; `cycle` counts from 1.
    WaitCycle { cycle: u64 },
    Log { level: LogLevel, message: String },
    /// The loop ended. Empty when it stopped on a fatal error.
    Completed { artifacts: Vec<PathBuf> },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&PipelineEvent::WaitCycle { cycle: 2 }).unwrap();
        assert_eq!(json, r#"{"event":"wait_cycle","cycle":2}"#);
        assert!(PipelineEvent::Completed { artifacts: vec![] }.is_terminal());
        assert!(!PipelineEvent::Begin {
            watch_dir: PathBuf::from("/data")
        }
        .is_terminal());
    }
}
