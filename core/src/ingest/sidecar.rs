use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::prelude::{PipelineError, PipelineResult};

/// Identifier of a raw file: its basename up to the first `.`.
pub fn file_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.split('.').next().map(str::to_owned))
        .unwrap_or_default()
}

/// Converted files produced for one raw file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFiles {
    pub id: String,
    /// `<id>.asc`, which carries the fly-scan temperature record.
    pub sidecar: PathBuf,
    /// Per-pass files ordered by their numeric suffixes.
    pub passes: Vec<PathBuf>,
}

impl ConvertedFiles {
    /// Finds the converted files next to `raw`. Two-level pass files
    /// (`<id>_*_*.asc`) win over single-level ones when both exist.
    pub fn locate(raw: &Path) -> PipelineResult<Self> {
        let dir = raw.parent().unwrap_or_else(|| Path::new("."));
        let id = file_id(raw);
        let prefix = format!("{}/{}", Pattern::escape(&dir.to_string_lossy()), Pattern::escape(&id));

        let nested = matching(&format!("{}_*_*.asc", prefix))?;
        let passes = if nested.is_empty() {
            matching(&format!("{}_*.asc", prefix))?
        } else {
            nested
        };
        if passes.is_empty() {
            return Err(PipelineError::MissingConversion(raw.to_path_buf()));
        }

        let mut passes = passes;
        passes.sort_by(|a, b| compare_suffix(&id, a, b));
        Ok(Self {
            sidecar: dir.join(format!("{}.asc", id)),
            id,
            passes,
        })
    }
}

fn matching(pattern: &str) -> PipelineResult<Vec<PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|err| PipelineError::Header(format!("bad sidecar pattern {}: {}", pattern, err)))?;
    Ok(paths.filter_map(Result::ok).collect())
}

fn suffix_numbers(id: &str, path: &Path) -> Option<Vec<u64>> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(id)?.strip_prefix('_')?;
    rest.split('_').map(|part| part.parse().ok()).collect()
}

fn compare_suffix(id: &str, a: &Path, b: &Path) -> Ordering {
    match (suffix_numbers(id, a), suffix_numbers(id, b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
