//! Seams between the ingestion loop and the outside world.

use std::path::{Path, PathBuf};

use crate::math::fft::PowerSpectrum;
use crate::prelude::{MirrorParameters, PipelineResult};
use crate::processing::extract::ExtractedProfile;
use crate::processing::fit::FitResult;

/// Produces the `.asc` files for a raw scan next to it.
pub trait AsciiConverter: Send {
    fn convert(&self, raw: &Path) -> PipelineResult<()>;
}

/// Reports whether the instrument is still acquiring.
pub trait BusyOracle: Send {
    fn is_busy(&self) -> bool;
}

/// Oracle for setups without an instrument status channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverBusy;

impl BusyOracle for NeverBusy {
    fn is_busy(&self) -> bool {
        false
    }
}

/// Everything produced for one raw file.
pub struct ResultBundle<'a> {
    pub raw: &'a Path,
    pub params: &'a MirrorParameters,
    pub profile: &'a ExtractedProfile,
    pub fit: &'a FitResult,
    pub slope_spectrum: PowerSpectrum,
    pub height_spectrum: PowerSpectrum,
}

impl ResultBundle<'_> {
    pub fn id(&self) -> &str {
        &self.profile.id
    }
}

/// Stores a bundle and returns the paths of what it wrote.
pub trait ResultsSink: Send {
    fn persist(&self, bundle: &ResultBundle<'_>) -> PipelineResult<Vec<PathBuf>>;
}
