//! Column discovery for converted scan files.
//!
//! The converter writes a commented header in which every recorded process
//! variable is listed on its own line together with its 1-based column
//! number. The scan mode is declared on a separate line.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::prelude::{PipelineError, PipelineResult};

/// Number of leading lines inspected for markers.
pub const HEADER_SCAN_LINES: usize = 200;

pub const FLY_SCAN_MARKER: &str = "scan mode, \"FLY\"";
pub const STEP_SCAN_MARKER: &str = "scan mode, \"LINEAR\"";
pub const TEMPERATURE_MARKERS: [&str; 5] = [
    "ltpu2:D1Ch2_raw.VAL",
    "ltpu2:D1Ch3_raw.VAL",
    "ltpu2:D1Ch4_raw.VAL",
    "ltpu2:D1Ch5_raw.VAL",
    "ltpu2:D1Ch6_raw.VAL",
];
pub const ELAPSED_TIME_MARKER: &str = "ltpu:timer1:elapsedSecs";

/// Autocollimator channels recorded by the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Hy,
    Hx,
    Sy,
    Sx,
    Vy,
    Vx,
}

impl Channel {
    /// Canonical order, shared by sign and filter vectors.
    pub const ALL: [Channel; 6] = [
        Channel::Hy,
        Channel::Hx,
        Channel::Sy,
        Channel::Sx,
        Channel::Vy,
        Channel::Vx,
    ];

    pub fn index(self) -> usize {
        match self {
            Channel::Hy => 0,
            Channel::Hx => 1,
            Channel::Sy => 2,
            Channel::Sx => 3,
            Channel::Vy => 4,
            Channel::Vx => 5,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Channel::Hy => "H-AC Y",
            Channel::Hx => "H-AC X",
            Channel::Sy => "S-AC Y",
            Channel::Sx => "S-AC X",
            Channel::Vy => "V-AC Y",
            Channel::Vx => "V-AC X",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Hy => "Hy",
            Channel::Hx => "Hx",
            Channel::Sy => "Sy",
            Channel::Sx => "Sx",
            Channel::Vy => "Vy",
            Channel::Vx => "Vx",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Fly,
    Step,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Fly => f.write_str("fly scan"),
            ScanMode::Step => f.write_str("step scan"),
        }
    }
}

/// Everything the header tells us about a converted file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderMap {
    pub mode: Option<ScanMode>,
    /// Zero-based column of each channel that was found.
    pub columns: BTreeMap<Channel, usize>,
    pub temperature_columns: Vec<usize>,
    pub elapsed_time_column: Option<usize>,
}

impl HeaderMap {
    pub fn is_complete(&self) -> bool {
        Channel::ALL.iter().all(|ch| self.columns.contains_key(ch))
    }

    pub fn column(&self, channel: Channel) -> PipelineResult<usize> {
        self.columns
            .get(&channel)
            .copied()
            .ok_or(PipelineError::MissingChannel(channel))
    }

    pub fn missing(&self) -> Vec<Channel> {
        Channel::ALL
            .iter()
            .copied()
            .filter(|ch| !self.columns.contains_key(ch))
            .collect()
    }
}

/// Scans the leading header lines for the scan mode and channel columns.
///
/// Temperature and elapsed-time columns are only collected once a step-scan
/// declaration has been seen.
pub fn scan_header<'a, I>(lines: I) -> PipelineResult<HeaderMap>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut map = HeaderMap::default();

    for line in lines.into_iter().take(HEADER_SCAN_LINES) {
        if line.contains(FLY_SCAN_MARKER) {
            map.mode = Some(ScanMode::Fly);
        }
        if line.contains(STEP_SCAN_MARKER) {
            map.mode = Some(ScanMode::Step);
            map.temperature_columns.clear();
        }

        if map.mode == Some(ScanMode::Step) {
            if TEMPERATURE_MARKERS.iter().any(|m| line.contains(m)) {
                map.temperature_columns.push(column_of(line)?);
            }
            if line.contains(ELAPSED_TIME_MARKER) {
                map.elapsed_time_column = Some(column_of(line)?);
            }
        }

        for channel in Channel::ALL {
            if line.contains(channel.marker()) {
                map.columns.insert(channel, column_of(line)?);
            }
        }
    }

    Ok(map)
}

pub fn scan_header_file(path: &Path) -> PipelineResult<HeaderMap> {
    let text = fs::read_to_string(path).map_err(|err| PipelineError::io(path, err))?;
    scan_header(text.lines())
}

/// Temperature sensor columns anywhere in a file, regardless of scan mode.
pub fn scan_temperature_columns<'a, I>(lines: I) -> PipelineResult<Vec<usize>>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter(|line| TEMPERATURE_MARKERS.iter().any(|m| line.contains(m)))
        .map(column_of)
        .collect()
}

/// The second whitespace token of a marker line is its 1-based column.
fn column_of(line: &str) -> PipelineResult<usize> {
    let token = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| PipelineError::Header(format!("no column number in `{}`", line.trim())))?;
    let number: usize = token.parse().map_err(|_| {
        PipelineError::Header(format!(
            "column token `{}` is not an integer in `{}`",
            token,
            line.trim()
        ))
    })?;
    number
        .checked_sub(1)
        .ok_or_else(|| PipelineError::Header(format!("column 0 in `{}`", line.trim())))
}
