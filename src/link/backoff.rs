//! Reconnect delay policy: a fixed base delay that escalates once after a
//! long failure streak and then holds steady until the next successful open.

use std::time::Duration;

/// Delay between attempts while the streak is below the threshold
pub(crate) const BASE_DELAY: Duration = Duration::from_millis(15_000);
/// Delay once the streak reaches [`ESCALATION_THRESHOLD`]
pub(crate) const ESCALATED_DELAY: Duration = Duration::from_millis(300_000);
/// Failure count at which the delay escalates, permanently for the streak
const ESCALATION_THRESHOLD: u32 = 40;

/// Mutable retry policy carried across connection attempts.
///
/// The delay never decreases within a failure streak; only a successful open
/// (via [`Backoff::reset`]) restores the base policy.
#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    escalated: Duration,
    delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub(crate) fn new(base: Duration, escalated: Duration) -> Self {
        Self {
            base,
            escalated,
            delay: base,
            attempts: 0,
        }
    }

    /// Records a failed attempt and returns the delay to wait before the next
    pub(crate) fn record_failure(&mut self) -> Duration {
        self.attempts += 1;
        if self.attempts == ESCALATION_THRESHOLD {
            self.delay = self.escalated;
        }
        self.delay
    }

    /// Restores the base policy after a successful open
    pub(crate) fn reset(&mut self) {
        self.delay = self.base;
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}
