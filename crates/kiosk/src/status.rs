/// Severity classification of a status update, consumed by the
/// presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Seam between the capture loop and whatever renders status text.
/// The presentation layer is passive; nothing flows back into the loop.
pub trait StatusSink {
    fn status_changed(&self, text: &str, severity: Severity);
}

/// Default sink for headless deployments: status goes to the log.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status_changed(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(status = %text, "Status"),
            Severity::Success => tracing::info!(status = %text, "Status (success)"),
            Severity::Error => tracing::warn!(status = %text, "Status (error)"),
        }
    }
}
