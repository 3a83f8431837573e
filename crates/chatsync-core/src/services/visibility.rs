use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Default)]
struct VisibilityState {
    hidden_since: Option<Instant>,
    last_hidden: Option<Duration>,
}

/// Tracks how long the app has been (or last was) in the background
#[derive(Default)]
pub struct VisibilityTracker {
    state: Mutex<VisibilityState>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the app going to the background. Repeated calls keep the first instant.
    pub fn mark_hidden(&self) {
        let mut state = self.state.lock();
        if state.hidden_since.is_none() {
            state.hidden_since = Some(Instant::now());
            state.last_hidden = None;
        }
    }

    /// Record the app coming back and return how long it was hidden
    pub fn mark_visible(&self) -> Duration {
        let mut state = self.state.lock();
        let hidden_for = state
            .hidden_since
            .take()
            .map(|since| since.elapsed())
            .unwrap_or_default();
        state.last_hidden = Some(hidden_for);
        hidden_for
    }

    pub fn is_hidden(&self) -> bool {
        self.state.lock().hidden_since.is_some()
    }

    /// Time spent hidden: the ongoing stretch if hidden now, else the last one
    pub fn hidden_duration(&self) -> Duration {
        let state = self.state.lock();
        match state.hidden_since {
            Some(since) => since.elapsed(),
            None => state.last_hidden.unwrap_or_default(),
        }
    }

    pub fn reset(&self) {
        *self.state.lock() = VisibilityState::default();
    }
}
