use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use glob::Pattern;

use super::collaborators::BusyOracle;
use crate::ingest::sidecar::file_id;
use crate::prelude::{PipelineError, PipelineResult};
use crate::telemetry::log::LogManager;

/// Consecutive status checks taken for a recently modified file.
pub const BUSY_CHECKS: usize = 4;
/// A file is ready once more than this many checks reported idle.
pub const IDLE_QUORUM: usize = 3;

/// Where to look for raw files and how to decide they are complete.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub watch_dir: PathBuf,
    pub results_dir: PathBuf,
    pub extension: String,
    /// Files untouched for longer than this are complete.
    pub settle_time: Duration,
    pub busy_check_interval: Duration,
    /// Pause between polling cycles.
    pub check_time: Duration,
    /// Polling cycles before the loop ends; zero or negative never ends.
    pub max_waiting_cycles: i64,
    /// Skips the results-folder and completeness checks.
    pub force_process: bool,
}

impl PollSettings {
    pub fn new(watch_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            results_dir: results_dir.into(),
            extension: "mda".into(),
            settle_time: Duration::from_secs(60),
            busy_check_interval: Duration::from_secs(1),
            check_time: Duration::from_secs(15),
            max_waiting_cycles: 10,
            force_process: false,
        }
    }

    pub fn cycle_limit(&self) -> Option<u64> {
        u64::try_from(self.max_waiting_cycles).ok().filter(|&n| n > 0)
    }
}

/// Raw files in the watch directory that are ready to process.
///
/// Fails only when the watch directory itself cannot be read.
pub fn discover_new_files(
    settings: &PollSettings,
    oracle: &dyn BusyOracle,
    logger: &LogManager,
) -> PipelineResult<Vec<PathBuf>> {
    fs::read_dir(&settings.watch_dir).map_err(|err| PipelineError::io(&settings.watch_dir, err))?;

    let pattern = format!(
        "{}/*.{}",
        Pattern::escape(&settings.watch_dir.to_string_lossy()),
        Pattern::escape(&settings.extension)
    );
    let candidates = glob::glob(&pattern)
        .map_err(|err| PipelineError::Header(format!("bad watch pattern {}: {}", pattern, err)))?
        .filter_map(Result::ok);

    let mut ready = Vec::new();
    for path in candidates {
        if settings.force_process {
            ready.push(path);
            continue;
        }
        if settings.results_dir.join(file_id(&path)).exists() {
            logger.record(&format!("skip...{}", path.display()));
            continue;
        }
        if settled(&path, settings.settle_time) || instrument_idle(oracle, settings.busy_check_interval) {
            ready.push(path);
        }
    }
    Ok(ready)
}

fn settled(path: &Path, settle_time: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map_or(false, |age| age > settle_time)
}

fn instrument_idle(oracle: &dyn BusyOracle, interval: Duration) -> bool {
    let mut idle = 0;
    for _ in 0..BUSY_CHECKS {
        if !oracle.is_busy() {
            idle += 1;
        }
        thread::sleep(interval);
    }
    idle > IDLE_QUORUM
}
