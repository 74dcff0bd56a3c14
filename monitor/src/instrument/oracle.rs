use ltpcore::pipeline::BusyOracle;
use std::process::{Command, Stdio};

/// Asks the instrument for its scan status by running a status command.
///
/// The instrument is busy when the command prints exactly the busy message.
/// A command that cannot run, or exits unsuccessfully, counts as idle.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    busy_message: String,
}

impl CommandOracle {
    /// `None` when `command` is empty.
    pub fn from_command(command: &[String], busy_message: impl Into<String>) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            busy_message: busy_message.into(),
        })
    }
}

impl BusyOracle for CommandOracle {
    fn is_busy(&self) -> bool {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim() == self.busy_message
            }
            Ok(_) => false,
            Err(err) => {
                log::debug!("status command {} failed: {}", self.program, err);
                false
            }
        }
    }
}
