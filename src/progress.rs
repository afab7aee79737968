//! Progress bar for ingestion runs.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ingestion::{AuditEvent, EntityKey, Outcome, ProgressCallback};

/// Draws one bar tick per entity and prints failures above the bar.
pub struct RunProgress {
    bar: ProgressBar,
    visible: bool,
}

impl RunProgress {
    pub fn new(visible: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            visible,
        }
    }
}

impl ProgressCallback for RunProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar = ProgressBar::new(total as u64);
        if !self.visible {
            self.bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let template = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            self.bar.set_style(style.progress_chars("=>-"));
        }
    }

    fn on_entity_start(&mut self, key: &EntityKey) {
        self.bar.set_message(key.to_string());
    }

    fn on_entity_complete(&mut self, event: &AuditEvent) {
        if event.outcome == Outcome::Failed {
            let reason = event
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            self.bar
                .suspend(|| println!("  {} {} ({reason})", "✗".red(), event.key()));
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}
