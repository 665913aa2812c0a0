//! Terminal progress bar fed by the orchestrator's progress reports

use crate::services::{ProcessingStage, ProgressReporter, ProgressUpdate};
use crate::types::ProcessingTimings;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const FILE_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}";

/// Renders one 0-100 bar per input file
pub struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    /// Create a bar, attached to `multi` when a batch bar is shown as well
    #[must_use]
    pub fn new(multi: Option<&MultiProgress>, hidden: bool) -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template(FILE_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        if hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let bar = match multi {
            Some(multi) => multi.add(bar),
            None => bar,
        };
        Self { bar }
    }

    /// Rewind the bar for the next input
    pub fn start_file(&self, name: &str) {
        self.bar.reset();
        self.bar.set_prefix(name.to_string());
        self.bar.set_message("");
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_position(update.progress.round() as u64);
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        self.bar.set_position(100);
        self.bar.set_message(format!("done in {}ms", timings.total_ms));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .abandon_with_message(format!("failed during {}: {}", stage.description(), error));
    }
}
