//! Leading-edge event coalescing.
//!
//! The first event of a burst fires at once. Later events inside the quiet
//! window are suppressed and the window restarts with each of them. With
//! `trailing` on, a suppressed burst fires once more after it has gone quiet.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    trailing: bool,
    last_event: Option<Instant>,
    pending: bool,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            trailing: true,
            last_event: None,
            pending: false,
        }
    }

    pub fn leading_only(window: Duration) -> Self {
        Self {
            trailing: false,
            ..Self::new(window)
        }
    }

    /// Records an event; returns true if it should be handled now.
    pub fn on_event(&mut self, now: Instant) -> bool {
        let quiet = self
            .last_event
            .is_none_or(|t| now.saturating_duration_since(t) >= self.window);
        self.last_event = Some(now);
        if quiet {
            self.pending = false;
            true
        } else {
            self.pending |= self.trailing;
            false
        }
    }

    /// Returns true once a suppressed burst has gone quiet.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(at) if now >= at => {
                self.pending = false;
                true
            }
            _ => false,
        }
    }

    /// When the trailing call is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_event.map(|t| t + self.window)
    }
}
