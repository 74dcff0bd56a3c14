use ltpcore::ingest::ScanMode;
use ltpcore::pipeline::ResultBundle;
use ltpcore::processing::{ErrorStats, FittedShape, RadiusEstimate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetrendSummary {
    pub order: usize,
    pub stats: ErrorStats,
}

/// Figures of merit for one processed file, written as `<id>_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub id: String,
    pub raw: PathBuf,
    pub scan_mode: Option<ScanMode>,
    pub passes_used: usize,
    pub samples: usize,
    pub shape: FittedShape,
    pub radius: RadiusEstimate,
    pub stats: ErrorStats,
    pub detrend: Vec<DetrendSummary>,
}

impl RunSummary {
    pub fn from_bundle(bundle: &ResultBundle<'_>) -> Self {
        let fit = bundle.fit;
        Self {
            id: bundle.id().to_owned(),
            raw: bundle.raw.to_path_buf(),
            scan_mode: bundle.profile.mode,
            passes_used: bundle.profile.passes_used,
            samples: fit.x.len(),
            shape: fit.shape,
            radius: fit.radius,
            stats: fit.stats,
            detrend: fit
                .detrend
                .iter()
                .map(|stage| DetrendSummary {
                    order: stage.order,
                    stats: stage.stats,
                })
                .collect(),
        }
    }

    /// One-line digest in the instrument's customary units.
    pub fn headline(&self) -> String {
        format!(
            "{}: radius {:.3}m, height error {:.2}nm RMS / {:.2}nm PV, slope error {:.2}nrad RMS / {:.3}µrad PV",
            self.id,
            self.radius.from_slope,
            self.stats.rms_height,
            self.stats.pv_height,
            self.stats.rms_slope * 1e3,
            self.stats.pv_slope
        )
    }
}
