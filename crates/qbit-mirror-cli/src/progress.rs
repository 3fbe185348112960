use indicatif::{ProgressBar, ProgressStyle};
use qbit_mirror_core::{Phase, ProgressReporter};
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Item phases (replicate, orphans, unwanted): progress bar over the batch
/// - Settle window: spinner counting down the seconds
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        // A poisoned lock only means a previous draw panicked; keep drawing.
        let mut guard = match self.bar.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    fn set_bar(&self, pb: ProgressBar) {
        self.with_bar(|slot| {
            if let Some(old) = slot.take() {
                old.finish_and_clear();
            }
            *slot = Some(pb);
        });
    }

    fn finish_bar(&self) {
        self.with_bar(|slot| {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        });
    }
}

fn bar_style(phase: Phase) -> ProgressStyle {
    let template = format!(
        "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} {{wide_msg}}",
        phase.title()
    );
    ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_phase_start(&self, phase: Phase) {
        eprintln!("\x1b[1m{}\x1b[0m", phase);
    }

    fn on_items_start(&self, phase: Phase, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(bar_style(phase));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_item_progress(&self, _phase: Phase, done: usize, _total: usize, name: &str) {
        self.with_bar(|slot| {
            if let Some(pb) = slot.as_ref() {
                pb.set_position(done.saturating_sub(1) as u64);
                pb.set_message(name.to_string());
            }
        });
    }

    fn on_items_complete(&self, phase: Phase, succeeded: usize, failed: usize) {
        self.finish_bar();
        let mark = if failed == 0 {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        eprintln!(
            "  {} {}: {} succeeded, {} failed",
            mark,
            phase.title(),
            succeeded,
            failed
        );
    }

    fn on_settle_tick(&self, remaining_secs: u64) {
        self.with_bar(|slot| {
            if slot.is_none() {
                let pb = ProgressBar::new_spinner();
                pb.set_style(spinner_style());
                pb.enable_steady_tick(Duration::from_millis(80));
                *slot = Some(pb);
            }
            if let Some(pb) = slot.as_ref() {
                pb.set_message(format!("Letting the destination settle... {}s", remaining_secs));
            }
        });
    }

    fn on_phase_complete(&self, phase: Phase, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Phase {} complete in {:.2}s",
            phase.number(),
            duration_secs
        );
    }
}
