mod config;
mod orchestrator;
mod schedule;
mod types;

pub use config::CorrectionConfig;
pub use orchestrator::{
    correct, run_correction, validate, CorrectionOutput, CorrectionServices, Validated,
};
pub use schedule::{build_schedule, EpochDescriptor, SLICE_CAPTURE_BASE, VOLUME_CAPTURE_BASE};
pub use types::{CorrectionStage, NoOpReporter, ProgressReporter};
