//! Active-speaker hysteresis.
//!
//! Raw voice-activity signals flap on every pause. The derived flag only
//! turns on after 1000ms of continuous speech and only turns off after
//! 60000ms of continuous silence; opposite raw edges inside the window
//! cancel the pending transition.

use std::time::Duration;

use tokio::time::Instant;

pub const SPEAKING_ON_DELAY: Duration = Duration::from_millis(1000);
pub const SPEAKING_OFF_DELAY: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    target: bool,
    deadline: Instant,
}

/// Per-tile debouncer, driven by the engine's timer loop.
///
/// Feed raw edges with [`raw_changed`](Self::raw_changed); fire due
/// transitions with [`tick`](Self::tick). The engine wakes at
/// [`pending_deadline`](Self::pending_deadline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeakerState {
    stable: bool,
    pending: Option<Pending>,
}

impl SpeakerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The debounced active-speaker flag.
    pub fn active(&self) -> bool {
        self.stable
    }

    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Feed a raw voice-activity edge.
    pub fn raw_changed(&mut self, raw: bool, now: Instant) {
        if raw == self.stable {
            // Back to the stable value before the window elapsed.
            self.pending = None;
            return;
        }
        match self.pending {
            // Repeated edges towards the same target keep the original
            // deadline; the window measures from the first qualifying edge.
            Some(p) if p.target == raw => {}
            _ => {
                let delay = if raw {
                    SPEAKING_ON_DELAY
                } else {
                    SPEAKING_OFF_DELAY
                };
                self.pending = Some(Pending {
                    target: raw,
                    deadline: now + delay,
                });
            }
        }
    }

    /// Apply a due transition. Returns true if the stable value changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(p) if p.deadline <= now => {
                self.stable = p.target;
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
