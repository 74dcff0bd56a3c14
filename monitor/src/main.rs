use anyhow::Context;
use clap::Parser;
use generator::profile::{write_step_scan, ScanGeneratorConfig};
use ltpcore::PipelineEvent;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::MonitorConfig;
use workflow::runner::Runner;

mod generator;
mod instrument;
mod report;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Watches an LTP data folder and reports mirror figure errors")]
struct Args {
    /// Load the monitor config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Folder receiving raw scan files
    #[arg(long)]
    watch: Option<PathBuf>,
    /// Folder receiving one results subfolder per scan
    #[arg(long)]
    results: Option<PathBuf>,
    /// Seconds between polling cycles
    #[arg(long)]
    check_time: Option<f64>,
    /// Polling cycles before exiting; zero or negative keeps watching
    #[arg(long, allow_hyphen_values = true)]
    max_waiting_cycles: Option<i64>,
    /// Reprocess files that already have results
    #[arg(long, default_value_t = false)]
    force: bool,
    /// Process a synthetic scan once and print its summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Generator settings for the offline scan, as YAML
    #[arg(long)]
    scan: Option<PathBuf>,
}

impl Args {
    fn monitor_config(&self) -> anyhow::Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };
        if let Some(watch) = &self.watch {
            config.folders.watch = watch.clone();
        }
        if let Some(results) = &self.results {
            config.folders.results = results.clone();
        }
        if let Some(check_time) = self.check_time {
            config.monitor.check_time = check_time;
        }
        if let Some(cycles) = self.max_waiting_cycles {
            config.monitor.max_waiting_cycles = cycles;
        }
        config.monitor.force_process |= self.force;
        config.validate()?;
        Ok(config)
    }

    fn scan_config(&self) -> anyhow::Result<ScanGeneratorConfig> {
        match &self.scan {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading scan config {}", path.display()))?;
                serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing scan config {}", path.display()))
            }
            None => Ok(ScanGeneratorConfig::default()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.monitor_config()?;

    if args.offline {
        return run_offline(config, args.scan_config()?);
    }

    let runner = Runner::new(config);
    log::info!(
        "watching {} every {:.1}s",
        runner.config().folders.watch.display(),
        runner.check_interval().as_secs_f64()
    );
    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime for the ingestion loop")?;
    let outcome = runtime.block_on(watch(runner));
    runtime.shutdown_background();
    outcome
}

/// Generates a scan into a scratch folder, unless `--watch` names a real one.
fn run_offline(mut config: MonitorConfig, scan: ScanGeneratorConfig) -> anyhow::Result<()> {
    let scratch = tempfile::tempdir().context("creating scratch folder")?;
    if config.folders.watch == MonitorConfig::default().folders.watch {
        config.folders.watch = scratch.path().join("raw");
        config.folders.results = scratch.path().join("results");
        config.monitor.force_process = true;
        let raw = write_step_scan(&config.folders.watch, "ltp_offline", &scan)?;
        log::info!("generated synthetic scan {}", raw.display());
    }

    let result = Runner::new(config).offline(true).run_once()?;
    println!(
        "Offline run -> processed {}, failed {}, artifacts {}",
        result.metrics.processed,
        result.metrics.failed,
        result.artifacts.len()
    );
    for summary in &result.summaries {
        println!("{}", summary.headline());
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    Ok(())
}

async fn watch(runner: Runner) -> anyhow::Result<()> {
    let (handle, mut events) = runner.build_loop().spawn();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    report_event(&event);
                    if event.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            interrupt = signal::ctrl_c() => {
                interrupt.context("awaiting Ctrl+C to exit")?;
                log::warn!("interrupted, leaving the current cycle unfinished");
                return Ok(());
            }
        }
    }
    let artifacts = handle.await.context("joining ingestion loop")?;
    log::info!("monitor finished with {} artifacts", artifacts.len());
    Ok(())
}

fn report_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Begin { watch_dir } => log::info!("watching {}", watch_dir.display()),
        PipelineEvent::FileStarted { file } => log::info!("processing {}", file.display()),
        PipelineEvent::WaitCycle { cycle } => log::debug!("cycle {} done", cycle),
        // already written through the log facade by the loop
        PipelineEvent::Log { .. } => {}
        PipelineEvent::Completed { artifacts } => {
            log::info!("wrote {} artifacts", artifacts.len())
        }
    }
}
