//! Terminal progress rendering for edit and generation commands

use crate::{
    services::{ProcessingStage, ProgressReporter, ProgressUpdate},
    types::ProcessingTimings,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter drawing a single spinner bar on stderr
///
/// Generation dominates wall time and reports no intermediate progress, so
/// the spinner keeps ticking while the bar sits at the generation stage.
#[derive(Debug)]
pub struct SpinnerProgressReporter {
    bar: ProgressBar,
    verbose: bool,
}

impl SpinnerProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar, verbose }
    }

    /// Reporter that draws nothing, for non-interactive output
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose: false,
        }
    }
}

impl ProgressReporter for SpinnerProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_position(u64::from(update.progress));
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        self.bar.set_position(100);
        self.bar
            .finish_with_message(format!("done in {:.2}s", timings.total_ms as f64 / 1000.0));

        if self.verbose {
            log::info!("📊 Processing breakdown:");
            log::info!("  ├─ Decode: {}ms", timings.decode_ms);
            log::info!("  ├─ Preprocessing: {}ms", timings.preprocessing_ms);
            log::info!("  ├─ Reference: {}ms", timings.reference_ms);
            log::info!("  ├─ Analysis: {}ms", timings.analysis_ms);
            log::info!("  ├─ Generation: {}ms", timings.generation_ms);
            log::info!("  └─ Persist: {}ms", timings.persist_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .abandon_with_message(format!("failed while {}: {}", stage.description(), error));
    }
}
