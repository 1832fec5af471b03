//! Resettable keep-alive timer.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Countdown used to schedule keep-alives.
///
/// Clones share the period, so [`Timer::set_duration`] on any handle changes
/// the cadence of all of them. The deadline armed by [`Timer::start`] is per
/// handle; concurrent conversations never push back each other's wake-ups.
#[derive(Debug, Clone)]
pub struct Timer {
    period: Arc<Mutex<Duration>>,
    deadline: Option<Instant>,
}

impl Timer {
    /// Create an unarmed timer with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period: Arc::new(Mutex::new(period)),
            deadline: None,
        }
    }

    /// Arm the timer to fire one period from now.
    ///
    /// A period too large to represent as a deadline leaves the timer unarmed.
    pub fn start(&mut self) {
        self.deadline = Instant::now().checked_add(self.duration());
    }

    /// Wait until the armed deadline. Never resolves if the timer was not started.
    ///
    /// Cancel safe: dropping the future leaves the deadline armed.
    pub async fn wait(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Change the period used by subsequent [`Timer::start`] calls.
    pub fn set_duration(&self, period: Duration) {
        *self.period.lock() = period;
    }

    /// Current period.
    pub fn duration(&self) -> Duration {
        *self.period.lock()
    }
}
