use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::header::{scan_temperature_columns, Channel, HeaderMap};
use crate::prelude::{PipelineError, PipelineResult};

/// Column holding the scan position in every converted pass file.
pub const POSITION_COLUMN: usize = 1;
/// Column holding the acquisition time in a fly-scan sidecar.
pub const FLY_TIME_COLUMN: usize = 0;

/// Rectangular numeric body of a converted file.
#[derive(Debug, Clone)]
pub struct ChannelTable {
    path: PathBuf,
    data: Array2<f64>,
}

impl ChannelTable {
    /// Parses the table body. Blank lines and `#` lines are skipped and
    /// trailing `#` comments are stripped.
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> PipelineResult<Self> {
        let path = path.into();
        let mut values = Vec::new();
        let mut width: Option<usize> = None;
        let mut rows = 0;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let before = values.len();
            for token in line.split_whitespace() {
                let value: f64 = token.parse().map_err(|_| PipelineError::Table {
                    path: path.clone(),
                    line: index + 1,
                    reason: format!("`{}` is not a number", token),
                })?;
                values.push(value);
            }

            let count = values.len() - before;
            match width {
                None => width = Some(count),
                Some(expected) if expected != count => {
                    return Err(PipelineError::Table {
                        path,
                        line: index + 1,
                        reason: format!("expected {} columns, found {}", expected, count),
                    });
                }
                Some(_) => {}
            }
            rows += 1;
        }

        let data = Array2::from_shape_vec((rows, width.unwrap_or(0)), values).map_err(|err| {
            PipelineError::Table {
                path: path.clone(),
                line: 0,
                reason: err.to_string(),
            }
        })?;
        Ok(Self { path, data })
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| PipelineError::io(path, err))?;
        Self::parse(path, &text)
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn columns(&self) -> usize {
        self.data.ncols()
    }

    pub fn column(&self, index: usize) -> PipelineResult<ArrayView1<'_, f64>> {
        if index >= self.columns() {
            return Err(PipelineError::Table {
                path: self.path.clone(),
                line: 0,
                reason: format!(
                    "column {} requested but the table has {}",
                    index + 1,
                    self.columns()
                ),
            });
        }
        Ok(self.data.index_axis(Axis(1), index))
    }

    pub fn column_vec(&self, index: usize) -> PipelineResult<Vec<f64>> {
        Ok(self.column(index)?.to_vec())
    }
}

/// Position axis and requested channels of one scan pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassData {
    pub x: Vec<f64>,
    pub channels: BTreeMap<Channel, Vec<f64>>,
}

impl PassData {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn channel(&self, channel: Channel) -> PipelineResult<&[f64]> {
        self.channels
            .get(&channel)
            .map(Vec::as_slice)
            .ok_or(PipelineError::MissingChannel(channel))
    }
}

pub fn load_pass(path: &Path, header: &HeaderMap, channels: &[Channel]) -> PipelineResult<PassData> {
    let table = ChannelTable::load(path)?;
    pass_from_table(&table, header, channels)
}

pub fn pass_from_table(
    table: &ChannelTable,
    header: &HeaderMap,
    channels: &[Channel],
) -> PipelineResult<PassData> {
    let x = table.column_vec(POSITION_COLUMN)?;
    let mut columns = BTreeMap::new();
    for &channel in channels {
        columns.insert(channel, table.column_vec(header.column(channel)?)?);
    }
    Ok(PassData {
        x,
        channels: columns,
    })
}

/// Time axis and one series per temperature sensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSeries {
    pub time: Vec<f64>,
    pub sensors: Vec<Vec<f64>>,
}

impl TemperatureSeries {
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Reads the fly-scan sidecar, where the sensor columns may be declared
/// anywhere in the file and time is the first column.
pub fn load_fly_temperature(sidecar: &Path) -> PipelineResult<TemperatureSeries> {
    let text = fs::read_to_string(sidecar).map_err(|err| PipelineError::io(sidecar, err))?;
    let sensor_columns = scan_temperature_columns(text.lines())?;
    let table = ChannelTable::parse(sidecar, &text)?;

    let time = table.column_vec(FLY_TIME_COLUMN)?;
    let sensors = sensor_columns
        .iter()
        .map(|&col| table.column_vec(col))
        .collect::<PipelineResult<Vec<_>>>()?;
    Ok(TemperatureSeries { time, sensors })
}

/// Concatenates the sensor readings of every step-scan pass.
///
/// Elapsed times restart in each pass, so each pass is offset by the last
/// time of the previous one; the resulting axis is resampled as
/// `index * mean(dt)`.
pub fn load_step_temperature(files: &[PathBuf], header: &HeaderMap) -> PipelineResult<TemperatureSeries> {
    let time_column = header.elapsed_time_column.ok_or_else(|| {
        PipelineError::Header("step scan without an elapsed-time column".into())
    })?;

    let mut elapsed: Vec<f64> = Vec::new();
    let mut sensors: Vec<Vec<f64>> = vec![Vec::new(); header.temperature_columns.len()];

    for file in files {
        let table = ChannelTable::load(file)?;
        let offset = elapsed.last().copied().unwrap_or(0.0);
        elapsed.extend(table.column(time_column)?.iter().map(|t| t + offset));
        for (series, &col) in sensors.iter_mut().zip(&header.temperature_columns) {
            series.extend(table.column(col)?.iter());
        }
    }

    let step = if elapsed.len() > 1 {
        (elapsed[elapsed.len() - 1] - elapsed[0]) / (elapsed.len() - 1) as f64
    } else {
        0.0
    };
    let time = (0..elapsed.len()).map(|i| i as f64 * step).collect();
    Ok(TemperatureSeries { time, sensors })
}
