use indicatif::{ProgressBar, ProgressStyle};
use photo_organiser_core::{ProgressCallback, ProgressEvent, RunState};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Terminal progress bar driven by the organiser's progress callback
#[derive(Clone)]
pub struct ProgressTracker {
    bar: ProgressBar,
    /// Stage the bar is currently showing
    stage: Arc<Mutex<RunState>>,
    /// Start time of the current stage
    stage_started: Arc<Mutex<Instant>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:>13} {wide_bar} {pos}/{len} ({percent}%) | {msg}")
                .unwrap()
                .progress_chars("█▓▒░ "),
        );
        bar.set_prefix(RunState::Idle.to_string());

        Self {
            bar,
            stage: Arc::new(Mutex::new(RunState::Idle)),
            stage_started: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Callback to hand to `PhotoOrganiser::with_progress`
    pub fn callback(&self) -> ProgressCallback {
        let tracker = self.clone();
        Arc::new(move |event: &ProgressEvent| tracker.update(event))
    }

    fn update(&self, event: &ProgressEvent) {
        let mut stage = match self.stage.lock() {
            Ok(stage) => stage,
            Err(poisoned) => poisoned.into_inner(),
        };

        if *stage != event.stage {
            *stage = event.stage;
            if let Ok(mut started) = self.stage_started.lock() {
                *started = Instant::now();
            }
            self.bar.set_prefix(event.stage.to_string());
            self.bar.set_length(event.total as u64);
            self.bar.set_position(0);
        }

        // Workers report out of order; never move the bar backwards
        if event.processed as u64 > self.bar.position() {
            self.bar.set_position(event.processed as u64);
        }

        let rate = self
            .stage_started
            .lock()
            .map(|started| {
                let secs = started.elapsed().as_secs_f64();
                if secs > 0.0 {
                    event.processed as f64 / secs
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);

        self.bar.set_message(format!(
            "{} copied | {} errors | {:.1} files/s",
            event.copied, event.errors, rate
        ));

        if event.stage.is_terminal() {
            self.bar.finish_with_message(format!(
                "{} | {} copied | {} errors",
                event.stage, event.copied, event.errors
            ));
        }
    }
}
