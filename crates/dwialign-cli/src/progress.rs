use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use dwialign_core::correct::{CorrectionStage, EpochDescriptor, ProgressReporter};

/// Drives an indicatif bar from the correction loop's progress callbacks.
pub struct ProgressBarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressBarReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn replace(&self, bar: Option<ProgressBar>) {
        let mut slot = self.bar.lock().unwrap();
        if let Some(old) = slot.take() {
            old.finish_and_clear();
        }
        *slot = bar;
    }
}

impl ProgressReporter for ProgressBarReporter {
    fn begin_epoch(&self, epoch: &EpochDescriptor, position: usize, total: usize) {
        self.replace(None);
        println!(
            "Epoch {}/{}: {} granularity, capture scale {:.2}",
            position + 1,
            total,
            epoch.granularity,
            epoch.capture_scale
        );
    }

    fn begin_stage(&self, stage: CorrectionStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg:26} [{bar:40}] {pos}/{len}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        };
        bar.set_message(stage.to_string());
        self.replace(Some(bar));
    }

    fn advance(&self, items_done: usize) {
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            bar.set_position(items_done as u64);
        }
    }

    fn finish_stage(&self) {
        self.replace(None);
    }
}
