//! The polling loop that turns raw scans into fitted results.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;

use super::collaborators::{AsciiConverter, BusyOracle, ResultBundle, ResultsSink};
use super::watcher::{discover_new_files, PollSettings};
use crate::math::fft::profile_spectrum;
use crate::prelude::{MirrorParameters, PipelineError, PipelineResult};
use crate::processing::extract::ProfileExtractor;
use crate::processing::fit::fit_profile;
use crate::telemetry::events::PipelineEvent;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;

/// Loop-owned bookkeeping.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionState {
    /// Files that failed once and are never retried.
    pub skip: BTreeSet<PathBuf>,
    pub cycles: u64,
}

pub struct IngestionLoop {
    settings: PollSettings,
    params: MirrorParameters,
    converter: Box<dyn AsciiConverter>,
    oracle: Box<dyn BusyOracle>,
    sink: Box<dyn ResultsSink>,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
    state: IngestionState,
}

impl IngestionLoop {
    pub fn new(
        settings: PollSettings,
        params: MirrorParameters,
        converter: Box<dyn AsciiConverter>,
        oracle: Box<dyn BusyOracle>,
        sink: Box<dyn ResultsSink>,
    ) -> Self {
        Self {
            settings,
            params,
            converter,
            oracle,
            sink,
            logger: LogManager::new(),
            metrics: Arc::new(MetricsRecorder::new()),
            state: IngestionState::default(),
        }
    }

    pub fn with_logger(mut self, logger: LogManager) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    pub fn state(&self) -> &IngestionState {
        &self.state
    }

    /// Runs the loop on a blocking worker and streams its events.
    pub fn spawn(self) -> (JoinHandle<Vec<PathBuf>>, UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = unbounded_channel();
        let mut pipeline = self.with_logger(LogManager::with_sink(tx));
        let handle = tokio::task::spawn_blocking(move || pipeline.run());
        (handle, rx)
    }

    /// Polls until the cycle budget is spent and returns every artifact
    /// written. A failure or panic outside a single file ends the loop early
    /// with no artifacts.
    pub fn run(&mut self) -> Vec<PathBuf> {
        self.logger.emit(PipelineEvent::Begin {
            watch_dir: self.settings.watch_dir.clone(),
        });
        let mut artifacts = Vec::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.poll_until_done(&mut artifacts)
        }))
        .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))));
        let artifacts = match outcome {
            Ok(()) => artifacts,
            Err(err) => {
                self.logger.error(&format!("pipeline stopped: {}", err));
                Vec::new()
            }
        };
        self.logger.emit(PipelineEvent::Completed {
            artifacts: artifacts.clone(),
        });
        artifacts
    }

    fn poll_until_done(&mut self, artifacts: &mut Vec<PathBuf>) -> PipelineResult<()> {
        let limit = self.settings.cycle_limit();
        while limit.map_or(true, |max| self.state.cycles < max) {
            let files = discover_new_files(&self.settings, self.oracle.as_ref(), &self.logger)?;
            for raw in files {
                if self.state.skip.contains(&raw) {
                    continue;
                }
                match self.guarded(&raw) {
                    Ok(written) => {
                        self.metrics.record_processed();
                        artifacts.extend(written);
                    }
                    Err(err) => {
                        self.metrics.record_failure();
                        self.logger
                            .error(&format!("error in file: {}: {}", raw.display(), err));
                        self.state.skip.insert(raw);
                    }
                }
            }

            self.logger.record(&format!(
                "waiting {}s for new data...",
                self.settings.check_time.as_secs_f64()
            ));
            thread::sleep(self.settings.check_time);
            self.state.cycles += 1;
            self.metrics.record_cycle();
            self.logger.emit(PipelineEvent::WaitCycle {
                cycle: self.state.cycles,
            });
        }
        Ok(())
    }

    fn guarded(&self, raw: &Path) -> PipelineResult<Vec<PathBuf>> {
        panic::catch_unwind(AssertUnwindSafe(|| self.process_file(raw)))
            .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))))
    }

    /// Converts, extracts, fits and persists one raw file.
    pub fn process_file(&self, raw: &Path) -> PipelineResult<Vec<PathBuf>> {
        self.logger.emit(PipelineEvent::FileStarted {
            file: raw.to_path_buf(),
        });

        self.logger
            .warn(&format!("converting mda file: {}", raw.display()));
        match self.converter.convert(raw) {
            Ok(()) => self
                .logger
                .warn(&format!("converting mda file: {} done", raw.display())),
            Err(err) => self
                .logger
                .error(&format!("mda2ascii convert failed: {}: {}", raw.display(), err)),
        }

        let extractor = ProfileExtractor::new(self.params.clone(), self.logger.clone());
        let profile = extractor.extract(raw)?;
        let slope = profile.slope_profile()?;
        let fit = fit_profile(&self.params, &slope, self.logger.clone())?;

        let bundle = ResultBundle {
            raw,
            params: &self.params,
            profile: &profile,
            fit: &fit,
            slope_spectrum: profile_spectrum(&profile.x, &profile.slope),
            height_spectrum: profile_spectrum(&fit.x, &fit.height),
        };
        let written = self.sink.persist(&bundle)?;
        self.logger.record(&format!(
            "saved {} artifacts for {}",
            written.len(),
            bundle.id()
        ));
        Ok(written)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::stats::StatsHelper;
    use crate::pipeline::collaborators::NeverBusy;
    use crate::processing::fit::{FitResult, FittedShape};
    use crate::processing::slope::Orientation;
    use crate::telemetry::events::LogLevel;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::fmt::Write as _;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct CountingConverter {
        calls: Arc<AtomicUsize>,
    }

    impl AsciiConverter for CountingConverter {
        fn convert(&self, _raw: &Path) -> PipelineResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingConverter;

    impl AsciiConverter for PanickingConverter {
        fn convert(&self, _raw: &Path) -> PipelineResult<()> {
            panic!("converter crashed");
        }
    }

    struct PanickingOracle;

    impl BusyOracle for PanickingOracle {
        fn is_busy(&self) -> bool {
            panic!("status channel crashed");
        }
    }

    #[derive(Default, Clone)]
    struct MemorySink {
        fits: Arc<Mutex<Vec<(String, FitResult)>>>,
    }

    impl ResultsSink for MemorySink {
        fn persist(&self, bundle: &ResultBundle<'_>) -> PipelineResult<Vec<PathBuf>> {
            self.fits
                .lock()
                .unwrap()
                .push((bundle.id().to_owned(), bundle.fit.clone()));
            Ok(vec![PathBuf::from(format!("{}.json", bundle.id()))])
        }
    }

    fn settings(root: &Path, cycles: i64) -> PollSettings {
        let mut settings = PollSettings::new(root.join("raw"), root.join("results"));
        settings.check_time = Duration::ZERO;
        settings.busy_check_interval = Duration::ZERO;
        settings.max_waiting_cycles = cycles;
        settings.force_process = true;
        settings
    }

    fn vertical_params() -> MirrorParameters {
        MirrorParameters {
            orientation: Orientation::Vertical,
            half_length: 50.0,
            filter_orders: [0; 6],
            ..MirrorParameters::default()
        }
    }

    const HEADER: &str = "\
# scan mode, \"LINEAR\"
#  2  ltpu:m1.VAL
#  3  ltpu:S-AC Y
#  4  ltpu:V-AC X
";

    /// Three step-scan passes of a flat mirror with gaussian slope noise.
    fn write_flat_scan(dir: &Path, id: &str, sigma: f64, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, sigma).unwrap();
        fs::write(dir.join(format!("{}.mda", id)), b"raw").unwrap();
        for pass in 1..=3 {
            let mut text = String::from(HEADER);
            for i in 0..7 {
                let x = -50.0 + 100.0 * i as f64 / 6.0;
                writeln!(text, "{} {} {} 0", i + 1, x, noise.sample(&mut rng)).unwrap();
            }
            fs::write(dir.join(format!("{}_1_{}.asc", id, pass)), text).unwrap();
        }
    }

    #[test]
    fn failing_file_is_converted_once_and_skipped() {
        let root = tempfile::tempdir().unwrap();
        let raw_dir = root.path().join("raw");
        fs::create_dir_all(&raw_dir).unwrap();
        fs::write(raw_dir.join("broken.mda"), b"raw").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = IngestionLoop::new(
            settings(root.path(), 3),
            vertical_params(),
            Box::new(CountingConverter {
                calls: Arc::clone(&calls),
            }),
            Box::new(NeverBusy),
            Box::new(MemorySink::default()),
        );
        let artifacts = pipeline.run();

        assert!(artifacts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pipeline.state().skip.contains(&raw_dir.join("broken.mda")));
        assert_eq!(pipeline.state().cycles, 3);
        let metrics = pipeline.metrics().snapshot();
        assert_eq!((metrics.processed, metrics.failed, metrics.cycles), (0, 1, 3));
    }

    #[test]
    fn panicking_collaborator_only_skips_the_file() {
        let root = tempfile::tempdir().unwrap();
        let raw_dir = root.path().join("raw");
        fs::create_dir_all(&raw_dir).unwrap();
        fs::write(raw_dir.join("ltp_9.mda"), b"raw").unwrap();

        let mut pipeline = IngestionLoop::new(
            settings(root.path(), 2),
            vertical_params(),
            Box::new(PanickingConverter),
            Box::new(NeverBusy),
            Box::new(MemorySink::default()),
        );
        pipeline.run();
        assert_eq!(pipeline.state().skip.len(), 1);
        assert_eq!(pipeline.state().cycles, 2);
    }

    #[test]
    fn flat_mirror_scan_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let raw_dir = root.path().join("raw");
        fs::create_dir_all(&raw_dir).unwrap();
        let sigma = 0.5;
        write_flat_scan(&raw_dir, "ltp_0100", sigma, 7);

        let sink = MemorySink::default();
        let mut pipeline = IngestionLoop::new(
            settings(root.path(), 1),
            vertical_params(),
            Box::new(CountingConverter {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(NeverBusy),
            Box::new(sink.clone()),
        );
        let artifacts = pipeline.run();
        assert_eq!(artifacts, vec![PathBuf::from("ltp_0100.json")]);

        let fits = sink.fits.lock().unwrap();
        let (id, fit) = &fits[0];
        assert_eq!(id, "ltp_0100");
        assert_eq!(fit.x.len(), crate::processing::average::GRID_SIZE);
        let FittedShape::Flat { y0 } = fit.shape else {
            panic!("expected a flat fit");
        };
        // slope noise in µrad over a 100 mm trace gives heights of order sigma * L nm;
        // the ratio falls as the passes are sampled more densely
        let length = 100.0;
        assert!(y0.abs() < 3.0 * sigma * length * 1e-9);
        assert!(fit.stats.pv_height > sigma * length / 10.0, "pv {}", fit.stats.pv_height);
        assert!(fit.stats.pv_height < 10.0 * sigma * length, "pv {}", fit.stats.pv_height);
        assert!(StatsHelper::mean(&fit.residual_height).abs() < 1e-9);
        assert_eq!(fit.detrend.len(), 3);
    }

    #[test]
    fn unreadable_watch_directory_ends_the_loop() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = IngestionLoop::new(
            settings(root.path(), 0),
            vertical_params(),
            Box::new(CountingConverter {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(NeverBusy),
            Box::new(MemorySink::default()),
        );
        assert!(pipeline.run().is_empty());
        assert_eq!(pipeline.state().cycles, 0);
    }

    #[tokio::test]
    async fn spawned_loop_streams_events_until_completion() {
        let root = tempfile::tempdir().unwrap();
        let raw_dir = root.path().join("raw");
        fs::create_dir_all(&raw_dir).unwrap();
        write_flat_scan(&raw_dir, "ltp_0200", 0.5, 11);

        let pipeline = IngestionLoop::new(
            settings(root.path(), 2),
            vertical_params(),
            Box::new(CountingConverter {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(NeverBusy),
            Box::new(MemorySink::default()),
        );
        let (handle, mut events) = pipeline.spawn();

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            let done = event.is_terminal();
            seen.push(event);
            if done {
                break;
            }
        }
        let artifacts = handle.await.unwrap();

        assert_eq!(artifacts.len(), 2);
        assert!(matches!(
            seen.first(),
            Some(PipelineEvent::Begin { watch_dir }) if *watch_dir == raw_dir
        ));
        let started = seen
            .iter()
            .filter(|e| matches!(e, PipelineEvent::FileStarted { .. }))
            .count();
        assert_eq!(started, 2);
        let cycles: Vec<u64> = seen
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::WaitCycle { cycle } => Some(*cycle),
                _ => None,
            })
            .collect();
        assert_eq!(cycles, vec![1, 2]);
        assert!(matches!(
            seen.last(),
            Some(PipelineEvent::Completed { artifacts }) if artifacts.len() == 2
        ));
    }

    #[tokio::test]
    async fn panic_outside_a_file_ends_the_loop_empty() {
        let root = tempfile::tempdir().unwrap();
        let raw_dir = root.path().join("raw");
        fs::create_dir_all(&raw_dir).unwrap();
        fs::write(raw_dir.join("ltp_0300.mda"), b"raw").unwrap();

        let mut config = settings(root.path(), 2);
        config.force_process = false;
        let pipeline = IngestionLoop::new(
            config,
            vertical_params(),
            Box::new(CountingConverter {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(PanickingOracle),
            Box::new(MemorySink::default()),
        );
        let metrics = pipeline.metrics();
        let (handle, mut events) = pipeline.spawn();

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        let artifacts = handle.await.unwrap();

        assert!(artifacts.is_empty());
        assert!(matches!(seen.first(), Some(PipelineEvent::Begin { .. })));
        assert!(seen.iter().any(|e| matches!(
            e,
            PipelineEvent::Log { level: LogLevel::Error, message } if message.contains("status channel crashed")
        )));
        assert!(matches!(
            seen.last(),
            Some(PipelineEvent::Completed { artifacts }) if artifacts.is_empty()
        ));
        assert_eq!(metrics.snapshot().cycles, 0);
    }
}
