use burn::train::renderer::{MetricState, MetricsRenderer, TrainingProgress};
use derive_new::new;

/// A renderer for TUI-disabled modes, writing metrics and progress to the log
#[derive(new)]
pub struct LogRenderer {}

impl LogRenderer {
    fn log_state(split: &str, state: MetricState) {
        match state {
            MetricState::Numeric(entry, value) => {
                log::debug!("[{split}] {}: {value}", entry.name)
            }
            MetricState::Generic(entry) => log::debug!("[{split}] {}: {}", entry.name, entry.formatted),
        }
    }

    fn log_progress(split: &str, item: TrainingProgress) {
        log::info!(
            "[{split}] epoch {}/{} - iteration {} - {}/{} items",
            item.epoch,
            item.epoch_total,
            item.iteration,
            item.progress.items_processed,
            item.progress.items_total,
        );
    }
}

impl MetricsRenderer for LogRenderer {
    fn update_train(&mut self, state: MetricState) {
        Self::log_state("train", state);
    }

    fn update_valid(&mut self, state: MetricState) {
        Self::log_state("valid", state);
    }

    fn render_train(&mut self, item: TrainingProgress) {
        Self::log_progress("train", item);
    }

    fn render_valid(&mut self, item: TrainingProgress) {
        Self::log_progress("valid", item);
    }
}
