use thiserror::Error;

/// Terminal conditions of a whole-document analysis run.
///
/// Per-unit retrieval failures never surface here: they are logged and the
/// unit contributes an empty recommendation list.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The caller cancelled the run. Partial progress was discarded and
    /// nothing was written to the cache.
    #[error("analysis cancelled by user")]
    Cancelled,

    /// A collaborator needed before any unit could be processed was
    /// unreachable.
    #[error("collaborator unavailable: {0:#}")]
    CollaboratorUnavailable(anyhow::Error),
}

impl AnalysisError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}
