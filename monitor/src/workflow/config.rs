use anyhow::Context;
use ltpcore::pipeline::PollSettings;
use ltpcore::MirrorParameters;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directories the monitor reads from and writes to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FolderConfig {
    pub watch: PathBuf,
    pub results: PathBuf,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            watch: PathBuf::from("."),
            results: PathBuf::from("results"),
        }
    }
}

/// Polling behaviour, times in seconds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub extension: String,
    pub check_time: f64,
    pub max_waiting_cycles: i64,
    pub settle_time: f64,
    pub busy_check_interval: f64,
    pub force_process: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            extension: "mda".into(),
            check_time: 15.0,
            max_waiting_cycles: 10,
            settle_time: 60.0,
            busy_check_interval: 1.0,
            force_process: false,
        }
    }
}

/// How to reach the converter tool and the instrument status.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstrumentConfig {
    /// `mda2ascii` executable.
    pub converter: PathBuf,
    /// Command printing the scan status message, e.g. `["caget", "-t", "ltpu:scan1.SMSG"]`.
    pub status_command: Vec<String>,
    pub busy_message: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            converter: PathBuf::from("mda2ascii"),
            status_command: Vec::new(),
            busy_message: "Scanning ...".into(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub folders: FolderConfig,
    pub mirror: MirrorParameters,
    pub monitor: PollingConfig,
    pub instrument: InstrumentConfig,
}

impl MonitorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading monitor config {}", path_ref.display()))?;
        let config: MonitorConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing monitor config {}", path_ref.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let polling = &self.monitor;
        for (name, value) in [
            ("check_time", polling.check_time),
            ("settle_time", polling.settle_time),
            ("busy_check_interval", polling.busy_check_interval),
        ] {
            anyhow::ensure!(
                value.is_finite() && value >= 0.0,
                "monitor.{} must be a non-negative number of seconds, got {}",
                name,
                value
            );
        }
        anyhow::ensure!(
            self.mirror.half_length > 0.0,
            "mirror.half_length must be positive"
        );
        Ok(())
    }

    pub fn to_poll_settings(&self) -> PollSettings {
        let polling = &self.monitor;
        PollSettings {
            watch_dir: self.folders.watch.clone(),
            results_dir: self.folders.results.clone(),
            extension: polling.extension.clone(),
            settle_time: Duration::from_secs_f64(polling.settle_time),
            busy_check_interval: Duration::from_secs_f64(polling.busy_check_interval),
            check_time: Duration::from_secs_f64(polling.check_time),
            max_waiting_cycles: polling.max_waiting_cycles,
            force_process: polling.force_process,
        }
    }
}
