use crate::instrument::{CommandOracle, Mda2AsciiConverter, PrecomputedConverter};
use crate::report::{DirectorySink, RunSummary};
use crate::workflow::config::MonitorConfig;
use anyhow::Context;
use ltpcore::pipeline::{AsciiConverter, BusyOracle, NeverBusy};
use ltpcore::telemetry::MetricsSnapshot;
use ltpcore::IngestionLoop;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of a bounded run.
pub struct WorkflowResult {
    pub artifacts: Vec<PathBuf>,
    pub metrics: MetricsSnapshot,
    pub summaries: Vec<RunSummary>,
}

/// Wires the configured instrument collaborators into an ingestion loop.
#[derive(Clone)]
pub struct Runner {
    config: MonitorConfig,
    offline: bool,
}

impl Runner {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            offline: false,
        }
    }

    /// Offline runs expect the ascii files to exist already and never
    /// query the instrument.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn build_loop(&self) -> IngestionLoop {
        let converter: Box<dyn AsciiConverter> = if self.offline {
            Box::new(PrecomputedConverter)
        } else {
            Box::new(Mda2AsciiConverter::new(&self.config.instrument.converter))
        };
        let instrument = &self.config.instrument;
        let oracle: Box<dyn BusyOracle> = match CommandOracle::from_command(
            &instrument.status_command,
            instrument.busy_message.as_str(),
        ) {
            Some(oracle) if !self.offline => Box::new(oracle),
            _ => Box::new(NeverBusy),
        };
        IngestionLoop::new(
            self.config.to_poll_settings(),
            self.config.mirror.clone(),
            converter,
            oracle,
            Box::new(DirectorySink::new(&self.config.folders.results)),
        )
    }

    /// Processes everything currently in the watch folder in a single cycle.
    pub fn run_once(&self) -> anyhow::Result<WorkflowResult> {
        fs::create_dir_all(&self.config.folders.results).with_context(|| {
            format!(
                "creating results folder {}",
                self.config.folders.results.display()
            )
        })?;

        let mut single = self.clone();
        single.config.monitor.max_waiting_cycles = 1;
        single.config.monitor.check_time = 0.0;
        let mut pipeline = single.build_loop();
        let metrics = pipeline.metrics();
        let artifacts = pipeline.run();

        let summaries = artifacts
            .iter()
            .filter(|path| {
                path.file_name()
                    .map_or(false, |name| name.to_string_lossy().ends_with("_summary.json"))
            })
            .filter_map(|path| match read_summary(path) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    // non-finite figures are written as null and do not read back
                    log::warn!("{:#}", err);
                    None
                }
            })
            .collect();

        Ok(WorkflowResult {
            artifacts,
            metrics: metrics.snapshot(),
            summaries,
        })
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.config.monitor.check_time)
    }
}

fn read_summary(path: &Path) -> anyhow::Result<RunSummary> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
