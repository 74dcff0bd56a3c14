use ltpcore::pipeline::AsciiConverter;
use ltpcore::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs the external `mda2ascii` tool, writing the ascii files next to the raw file.
#[derive(Debug, Clone)]
pub struct Mda2AsciiConverter {
    tool: PathBuf,
}

impl Mda2AsciiConverter {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    pub fn command(&self, raw: &Path) -> Command {
        let dir = raw.parent().unwrap_or_else(|| Path::new("."));
        let mut command = Command::new(&self.tool);
        command
            .arg("-d")
            .arg(dir)
            .arg(raw)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl AsciiConverter for Mda2AsciiConverter {
    /// The exit status is not inspected; missing output surfaces when the
    /// converted files are located.
    fn convert(&self, raw: &Path) -> PipelineResult<()> {
        let status = self
            .command(raw)
            .status()
            .map_err(|err| PipelineError::io(&self.tool, err))?;
        log::debug!("{} exited with {}", self.tool.display(), status);
        Ok(())
    }
}

/// For directories whose ascii files already exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedConverter;

impl AsciiConverter for PrecomputedConverter {
    fn convert(&self, _raw: &Path) -> PipelineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_targets_raw_file_directory() {
        let converter = Mda2AsciiConverter::new("/opt/mda/mda2ascii");
        let command = converter.command(Path::new("/data/ltp/scan_0001.mda"));
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(command.get_program(), "/opt/mda/mda2ascii");
        assert_eq!(args, vec!["-d", "/data/ltp", "/data/ltp/scan_0001.mda"]);
    }

    #[test]
    fn missing_tool_reports_io_error() {
        let converter = Mda2AsciiConverter::new("/nonexistent/mda2ascii");
        let err = converter.convert(Path::new("scan.mda")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
