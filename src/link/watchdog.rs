//! Liveness watchdog for an open uplink session. The server heartbeats with
//! keepalive probes; if none arrives within the window the session is
//! presumed dead and torn down.

use std::future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Window without a probe after which the session is considered stalled
pub(crate) const STALL_TIMEOUT: Duration = Duration::from_secs(75);

/// Single owned countdown per live session.
///
/// Arming replaces any outstanding deadline, so each probe restarts the full
/// window. Disarming is idempotent.
#[derive(Debug)]
pub(crate) struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// (Re)starts the countdown from now
    pub(crate) fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Cancels any outstanding countdown
    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Resolves once the armed window elapses. Never resolves while disarmed,
    /// which makes this usable directly as a `select!` branch.
    pub(crate) async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending().await,
        }
    }
}
