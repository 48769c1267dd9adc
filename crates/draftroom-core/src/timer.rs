// Pick clock: one cancelable countdown for the slot on the clock.
//
// The countdown task never touches the session. It only posts signals to the
// engine's mailbox, tagged with the generation it was armed under, and the
// engine drops any signal whose generation is no longer current.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// What a countdown reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Warning { remaining_secs: u64 },
    Expired,
}

/// A countdown signal addressed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSignal {
    pub slot_index: usize,
    pub generation: u64,
    pub event: ClockEvent,
}

/// Holds at most one live countdown.
#[derive(Debug)]
pub struct PickClock {
    mailbox: mpsc::UnboundedSender<ClockSignal>,
    generation: u64,
    active: Option<ActiveCountdown>,
}

#[derive(Debug)]
struct ActiveCountdown {
    slot_index: usize,
    deadline: Instant,
    wall_deadline: DateTime<Utc>,
    handle: JoinHandle<()>,
}

impl PickClock {
    pub fn new(mailbox: mpsc::UnboundedSender<ClockSignal>) -> Self {
        Self {
            mailbox,
            generation: 0,
            active: None,
        }
    }

    /// Cancel any live countdown and start a fresh one for `slot_index`.
    /// A `warning` of zero, or one not shorter than `duration`, is skipped.
    /// Returns the wall-clock deadline.
    pub fn arm(&mut self, slot_index: usize, duration: Duration, warning: Duration) -> DateTime<Utc> {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let mailbox = self.mailbox.clone();

        let deadline = Instant::now() + duration;
        let wall_deadline = Utc::now()
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());

        let handle = tokio::spawn(async move {
            if !warning.is_zero() && warning < duration {
                tokio::time::sleep_until(deadline - warning).await;
                let _ = mailbox.send(ClockSignal {
                    slot_index,
                    generation,
                    event: ClockEvent::Warning {
                        remaining_secs: warning.as_secs(),
                    },
                });
            }
            tokio::time::sleep_until(deadline).await;
            let _ = mailbox.send(ClockSignal {
                slot_index,
                generation,
                event: ClockEvent::Expired,
            });
        });

        debug!(
            slot_index,
            generation,
            secs = duration.as_secs(),
            "Pick clock armed"
        );
        self.active = Some(ActiveCountdown {
            slot_index,
            deadline,
            wall_deadline,
            handle,
        });
        wall_deadline
    }

    /// Stop the live countdown, if any. Signals it already posted become
    /// stale because the generation moves on at the next `arm`, and
    /// `is_current` refuses them while nothing is armed.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.abort();
            debug!(
                slot_index = active.slot_index,
                generation = self.generation,
                "Pick clock cancelled"
            );
        }
    }

    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    pub fn armed_slot(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.slot_index)
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.wall_deadline)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.active
            .as_ref()
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `signal` came from the countdown that is live right now.
    pub fn is_current(&self, signal: &ClockSignal) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.slot_index == signal.slot_index && signal.generation == self.generation)
    }
}

impl Drop for PickClock {
    fn drop(&mut self) {
        self.cancel();
    }
}
