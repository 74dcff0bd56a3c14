use std::collections::BTreeMap;
use std::path::Path;

use crate::ingest::header::{scan_header_file, Channel, HeaderMap, ScanMode};
use crate::ingest::loader::{
    load_fly_temperature, load_pass, load_step_temperature, TemperatureSeries,
};
use crate::ingest::sidecar::ConvertedFiles;
use crate::prelude::{MirrorParameters, PipelineError, PipelineResult, SlopeProfile};
use crate::processing::average::MultiPassAverager;
use crate::processing::filter::NoiseFilter;
use crate::processing::slope::crop;
use crate::telemetry::log::LogManager;

/// Averaged, cropped and filtered measurement of one raw file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedProfile {
    pub id: String,
    pub mode: Option<ScanMode>,
    pub header: HeaderMap,
    pub x: Vec<f64>,
    pub channels: BTreeMap<Channel, Vec<f64>>,
    pub slope: Vec<f64>,
    pub temperature: TemperatureSeries,
    pub passes_used: usize,
}

impl ExtractedProfile {
    pub fn slope_profile(&self) -> PipelineResult<SlopeProfile> {
        SlopeProfile::new(self.x.clone(), self.slope.clone())
    }
}

/// Turns the converted files of one raw file into a slope profile.
pub struct ProfileExtractor {
    params: MirrorParameters,
    averager: MultiPassAverager,
    logger: LogManager,
}

impl ProfileExtractor {
    pub fn new(params: MirrorParameters, logger: LogManager) -> Self {
        Self {
            params,
            averager: MultiPassAverager::new(),
            logger,
        }
    }

    pub fn extract(&self, raw: &Path) -> PipelineResult<ExtractedProfile> {
        let files = ConvertedFiles::locate(raw)?;
        self.extract_files(&files)
    }

    pub fn extract_files(&self, files: &ConvertedFiles) -> PipelineResult<ExtractedProfile> {
        let first = files
            .passes
            .first()
            .ok_or_else(|| PipelineError::MissingConversion(files.sidecar.clone()))?;
        let header = scan_header_file(first)?;
        self.logger.record(&format!("column number: {:?}", header.columns));
        if !header.is_complete() {
            self.logger.error(&format!(
                "header of {} lacks channels {:?}",
                first.display(),
                header.missing()
            ));
        }

        let temperature = self.temperature(files, &header);

        let passes = match self.params.pass_limit() {
            Some(limit) if limit < files.passes.len() => &files.passes[..limit],
            _ => &files.passes[..],
        };
        self.logger.record(&format!("use {} data files", passes.len()));

        let orientation = self.params.orientation;
        let channels = orientation.channels();
        let loaded = passes
            .iter()
            .map(|path| load_pass(path, &header, channels))
            .collect::<PipelineResult<Vec<_>>>()?;
        let averaged = self.averager.average(&loaded)?;

        let (x, channels) = if orientation.filter_before_crop() {
            let filtered = self.filter(averaged.channels)?;
            crop(&averaged.x, &filtered, self.params.half_length)
        } else {
            let (x, cropped) = crop(&averaged.x, &averaged.channels, self.params.half_length);
            (x, self.filter(cropped)?)
        };
        let slope = orientation.compose_slope(&channels, &self.params.slope_signs)?;

        Ok(ExtractedProfile {
            id: files.id.clone(),
            mode: header.mode,
            header,
            x,
            channels,
            slope,
            temperature,
            passes_used: passes.len(),
        })
    }

    fn filter(&self, channels: BTreeMap<Channel, Vec<f64>>) -> PipelineResult<BTreeMap<Channel, Vec<f64>>> {
        let orientation = self.params.orientation;
        channels
            .into_iter()
            .map(|(channel, values)| {
                let order = orientation.filter_order(channel, &self.params.filter_orders);
                Ok((channel, NoiseFilter::Polynomial(order).apply(&values)?))
            })
            .collect()
    }

    /// Temperature is informative only; failures leave the series empty.
    fn temperature(&self, files: &ConvertedFiles, header: &HeaderMap) -> TemperatureSeries {
        let loaded = match header.mode {
            Some(ScanMode::Step) => load_step_temperature(&files.passes, header),
            Some(ScanMode::Fly) => load_fly_temperature(&files.sidecar),
            None => return TemperatureSeries::default(),
        };
        loaded.unwrap_or_else(|err| {
            self.logger
                .warn(&format!("temperature record unavailable for {}: {}", files.id, err));
            TemperatureSeries::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::slope::Orientation;
    use std::fmt::Write as _;
    use std::fs;

    const HEADER: &str = "\
# scan mode, \"LINEAR\"
#  2  ltpu:m1.VAL
#  3  ltpu:H-AC Y
#  4  ltpu:H-AC X
#  5  ltpu:S-AC Y
#  6  ltpu:S-AC X
#  7  ltpu:V-AC Y
#  8  ltpu:V-AC X
#  9  ltpu2:D1Ch2_raw.VAL
# 10  ltpu:timer1:elapsedSecs
";

    /// Sy = 1 + x/100, Vx = 2 everywhere, other channels 0.
    fn write_pass(dir: &Path, name: &str, start: f64, end: f64) {
        let mut text = String::from(HEADER);
        for i in 0..=40 {
            let x = start + (end - start) * i as f64 / 40.0;
            writeln!(
                text,
                "{} {} 0 0 {} 0 0 2 20.5 {}",
                i + 1,
                x,
                1.0 + x / 100.0,
                i
            )
            .unwrap();
        }
        fs::write(dir.join(name), text).unwrap();
    }

    fn params(orientation: Orientation) -> MirrorParameters {
        MirrorParameters {
            orientation,
            half_length: 10.0,
            filter_orders: [0; 6],
            ..MirrorParameters::default()
        }
    }

    #[test]
    fn vertical_profile_is_cropped_and_composed() {
        let dir = tempfile::tempdir().unwrap();
        write_pass(dir.path(), "ltp_1_1_1.asc", -20.0, 20.0);
        write_pass(dir.path(), "ltp_1_1_2.asc", -18.0, 22.0);
        let extractor = ProfileExtractor::new(params(Orientation::Vertical), LogManager::new());
        let profile = extractor.extract(&dir.path().join("ltp_1.mda")).unwrap();

        assert_eq!(profile.passes_used, 2);
        assert_eq!(profile.mode, Some(ScanMode::Step));
        assert!(profile.x.iter().all(|v| v.abs() <= 10.0));
        for (x, s) in profile.x.iter().zip(&profile.slope) {
            assert!((s - (1.0 + x / 100.0 - 2.0)).abs() < 1e-9);
        }
        assert_eq!(profile.temperature.sensors.len(), 1);
        assert_eq!(profile.temperature.time.len(), 82);
    }

    #[test]
    fn pass_limit_caps_the_files_used() {
        let dir = tempfile::tempdir().unwrap();
        for k in 1..=3 {
            write_pass(dir.path(), &format!("ltp_2_1_{}.asc", k), -20.0, 20.0);
        }
        let mut config = params(Orientation::Full);
        config.max_passes = 2;
        let profile = ProfileExtractor::new(config, LogManager::new())
            .extract(&dir.path().join("ltp_2.mda"))
            .unwrap();
        assert_eq!(profile.passes_used, 2);
        assert_eq!(profile.channels.len(), 6);
    }

    #[test]
    fn header_without_required_channel_fails_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let text = "# scan mode, \"FLY\"\n#  3  ltpu:S-AC Y\n1 0.0 1.0\n2 1.0 1.0\n";
        fs::write(dir.path().join("ltp_3_1.asc"), text).unwrap();
        let extractor = ProfileExtractor::new(params(Orientation::Vertical), LogManager::new());
        let err = extractor.extract(&dir.path().join("ltp_3.mda")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingChannel(Channel::Vx)));
    }
}
