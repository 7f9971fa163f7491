//! Cancellable one-shot deadline
//!
//! A `Timer` belongs to exactly one state machine. Scheduling replaces any
//! previous deadline, so a superseded timer can never fire.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to fire `after` from `now`, cancelling any earlier arming
    pub fn schedule(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the timer is armed and its deadline has passed
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_new_timer_is_disarmed() {
        let timer = Timer::new();
        assert!(!timer.is_armed());
        assert!(!timer.is_due(Instant::now()));
    }

    #[test]
    fn test_schedule_and_due() {
        let t0 = Instant::now();
        let mut timer = Timer::new();
        timer.schedule(t0, 50 * MS);

        assert_eq!(timer.deadline(), Some(t0 + 50 * MS));
        assert!(!timer.is_due(t0 + 49 * MS));
        assert!(timer.is_due(t0 + 50 * MS));
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let t0 = Instant::now();
        let mut timer = Timer::new();
        timer.schedule(t0, 50 * MS);
        timer.schedule(t0 + 40 * MS, 50 * MS);

        assert!(!timer.is_due(t0 + 60 * MS));
        assert!(timer.is_due(t0 + 90 * MS));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut timer = Timer::new();
        timer.schedule(t0, MS);
        timer.cancel();

        assert!(!timer.is_armed());
        assert!(!timer.is_due(t0 + 100 * MS));
    }
}
