use log::{error, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use super::events::{LogLevel, PipelineEvent};

/// Writes through the `log` facade and, when attached, mirrors every line
/// and lifecycle event onto the pipeline event channel.
#[derive(Clone, Default)]
pub struct LogManager {
    sink: Option<UnboundedSender<PipelineEvent>>,
}

impl LogManager {
    pub fn new() -> Self {
        Self { sink: None }
    }

    pub fn with_sink(sink: UnboundedSender<PipelineEvent>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn record(&self, message: &str) {
        info!("{}", message);
        self.forward(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", message);
        self.forward(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        error!("{}", message);
        self.forward(LogLevel::Error, message);
    }

    /// Sends a lifecycle event. A closed receiver is ignored.
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(sink) = &self.sink {
            let _ = sink.send(event);
        }
    }

    fn forward(&self, level: LogLevel, message: &str) {
        self.emit(PipelineEvent::Log {
            level,
            message: message.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn records_are_mirrored_to_the_channel() {
        let (tx, mut rx) = unbounded_channel();
        let logger = LogManager::with_sink(tx);
        logger.warn("skip...");
        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineEvent::Log {
                level: LogLevel::Warn,
                message: "skip...".into()
            }
        );
    }

    #[test]
    fn detached_logger_does_not_panic() {
        let logger = LogManager::new();
        logger.record("no sink");
        logger.emit(PipelineEvent::WaitCycle { cycle: 1 });
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        LogManager::with_sink(tx).error("nobody listening");
    }
}
