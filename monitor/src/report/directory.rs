use anyhow::Context;
use ltpcore::ingest::Channel;
use ltpcore::pipeline::{ResultBundle, ResultsSink};
use ltpcore::prelude::MirrorShape;
use ltpcore::{PipelineError, PipelineResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::model::RunSummary;

/// Writes every bundle into `<root>/<id>/`.
///
/// The per-file folder doubles as the "already processed" marker the watcher
/// looks for.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write_all(&self, bundle: &ResultBundle<'_>) -> anyhow::Result<Vec<PathBuf>> {
        let id = bundle.id();
        let dir = self.root.join(id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating results folder {}", dir.display()))?;

        let mut written = Vec::new();
        written.push(write_json(&dir.join("setting.json"), bundle.params)?);
        if bundle.params.shape == MirrorShape::Ellipse {
            written.push(write_json(&dir.join("fitted_param.json"), &bundle.fit.shape)?);
        }
        written.push(write_measurement(&dir.join(format!("{}_LTP_measurement.csv", id)), bundle)?);
        if !bundle.profile.temperature.is_empty() {
            written.push(write_temperature(&dir.join(format!("{}_temperature.csv", id)), bundle)?);
        }
        written.push(write_spectra(&dir.join(format!("{}_psd.csv", id)), bundle)?);
        written.push(write_json(
            &dir.join(format!("{}_summary.json", id)),
            &RunSummary::from_bundle(bundle),
        )?);
        Ok(written)
    }
}

impl ResultsSink for DirectorySink {
    fn persist(&self, bundle: &ResultBundle<'_>) -> PipelineResult<Vec<PathBuf>> {
        self.write_all(bundle)
            .map_err(|err| PipelineError::Persist(format!("{:#}", err)))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<PathBuf> {
    let text = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn csv_writer(path: &Path) -> anyhow::Result<csv::Writer<fs::File>> {
    csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))
}

/// Summary line, column titles, then one row per sample.
fn write_measurement(path: &Path, bundle: &ResultBundle<'_>) -> anyhow::Result<PathBuf> {
    let profile = bundle.profile;
    let fit = bundle.fit;
    let mut writer = csv_writer(path)?;

    let mut summary = vec![
        format!("radius: {}m", fit.radius.from_slope),
        format!(
            "Height error: {:.2}nm RMS, {:.2}nm PV",
            fit.stats.rms_height, fit.stats.pv_height
        ),
        format!(
            "slope error: {:.2}nrad, {:.2}µrad",
            fit.stats.rms_slope * 1e3,
            fit.stats.pv_slope
        ),
    ];
    for stage in &fit.detrend {
        summary.push(format!(
            "remove {} order polyfit: {:.2}nrad RMS, {:.2}µrad PV, {:.2}nm RMS, {:.2}nm PV",
            stage.order,
            stage.stats.rms_slope * 1e3,
            stage.stats.pv_slope,
            stage.stats.rms_height,
            stage.stats.pv_height
        ));
    }
    writer.write_record(&summary)?;

    let channels: Vec<(Channel, &Vec<f64>)> =
        profile.channels.iter().map(|(&ch, v)| (ch, v)).collect();
    let mut titles = vec!["X [mm]".to_owned()];
    titles.extend(channels.iter().map(|(ch, _)| format!("{} [µrad]", ch)));
    titles.extend(
        ["slope [µrad]", "height", "height error", "slope error"]
            .iter()
            .map(|s| s.to_string()),
    );
    for stage in &fit.detrend {
        titles.push(format!(
            "slope error after removing {} order polyfit [µrad]",
            stage.order
        ));
        titles.push(format!(
            "height error after removing {} order polyfit [nm]",
            stage.order
        ));
    }
    writer.write_record(&titles)?;

    for k in 0..profile.x.len() {
        let mut row = vec![profile.x[k]];
        row.extend(channels.iter().map(|(_, values)| values[k]));
        row.extend([
            profile.slope[k],
            fit.height[k],
            fit.residual_height[k],
            fit.residual_slope[k],
        ]);
        for stage in &fit.detrend {
            row.push(stage.slope[k]);
            row.push(stage.height[k]);
        }
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_temperature(path: &Path, bundle: &ResultBundle<'_>) -> anyhow::Result<PathBuf> {
    let series = &bundle.profile.temperature;
    let mut writer = csv_writer(path)?;
    let mut titles = vec!["time".to_owned()];
    titles.extend((1..=series.sensors.len()).map(|i| format!("T{}", i)));
    writer.write_record(&titles)?;
    for (k, time) in series.time.iter().enumerate() {
        let mut row = vec![time.to_string()];
        row.extend(
            series
                .sensors
                .iter()
                .map(|sensor| sensor.get(k).map(f64::to_string).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_spectra(path: &Path, bundle: &ResultBundle<'_>) -> anyhow::Result<PathBuf> {
    let slope = &bundle.slope_spectrum;
    let height = &bundle.height_spectrum;
    let mut writer = csv_writer(path)?;
    writer.write_record(["frequency [1/mm]", "slope psd", "height psd"])?;
    for (k, frequency) in slope.frequency.iter().enumerate() {
        writer.write_record([
            frequency.to_string(),
            slope.density[k].to_string(),
            height.density.get(k).map(f64::to_string).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}
