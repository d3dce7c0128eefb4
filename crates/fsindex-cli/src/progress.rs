use colored::*;
use fsindex_core::{ScanEvent, ScanSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// Renders orchestrator events on an indicatif spinner.
pub struct CliReporter {
    bar: ProgressBar,
    errors: usize,
}

impl CliReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.set_message("Loading scan plan...");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar, errors: 0 }
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Block until the cycle finishes. `None` if the orchestrator went away first.
    pub fn watch(&mut self, events: &Receiver<ScanEvent>) -> Option<ScanSummary> {
        while let Ok(event) = events.recv() {
            match event {
                ScanEvent::Progress(status) => self.bar.set_message(status),
                ScanEvent::ScanError(msg) => {
                    self.errors += 1;
                    self.bar.println(format!("  {} {}", "✗".red(), msg));
                }
                ScanEvent::Finished(summary) => {
                    self.bar.finish_and_clear();
                    return Some(summary);
                }
            }
        }
        self.bar.finish_and_clear();
        None
    }
}
