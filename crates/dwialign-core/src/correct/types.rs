use super::schedule::EpochDescriptor;

/// Correction stage, used for progress reporting.
#[derive(Clone, Copy, Debug)]
pub enum CorrectionStage {
    Masking,
    Reconstruction,
    Weighting,
    Registration,
}

impl std::fmt::Display for CorrectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Masking => write!(f, "Generating mask"),
            Self::Reconstruction => write!(f, "Reconstructing prediction"),
            Self::Weighting => write!(f, "Weighting slices"),
            Self::Registration => write!(f, "Registering"),
        }
    }
}

/// Thread-safe progress reporting for the correction loop.
///
/// Implementors can drive progress bars or logging; all methods have
/// default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new epoch has started.
    fn begin_epoch(&self, _epoch: &EpochDescriptor, _position: usize, _total: usize) {}

    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g. registration unit count), if known.
    fn begin_stage(&self, _stage: CorrectionStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
