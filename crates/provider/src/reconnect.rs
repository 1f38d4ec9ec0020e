// Decides whether and when to dial again after a connection loss. The
// provider loop owns the actual timer; this is only the bookkeeping, kept
// free of I/O so the invariants test as plain functions.
//
// Invariants: at most one attempt is pending at any moment, and an explicit
// shutdown is terminal until the next request to connect.

use std::time::Duration;

pub struct ReconnectScheduler {
    delay: Duration,
    stay_connected: bool,
    pending: bool,
}

impl ReconnectScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            stay_connected: false,
            pending: false,
        }
    }

    /// Arm the scheduler: the provider wants to stay connected until an
    /// explicit shutdown.
    pub fn request_connect(&mut self) {
        self.stay_connected = true;
    }

    /// Stop scheduling attempts and cancel a pending one. Returns whether a
    /// timer was pending and must be cleared by the caller.
    pub fn shutdown(&mut self) -> bool {
        self.stay_connected = false;
        self.cancel_pending()
    }

    /// Forget a pending attempt without disarming the scheduler. Returns
    /// whether a timer was pending.
    pub fn cancel_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// The active session closed. Returns the delay to wait before the next
    /// attempt, or `None` when no attempt should be scheduled (shut down, or
    /// one is already pending).
    pub fn on_session_closed(&mut self) -> Option<Duration> {
        if !self.stay_connected || self.pending {
            return None;
        }
        self.pending = true;
        Some(self.delay)
    }

    /// The pending timer fired. True when the attempt should proceed; a
    /// shutdown that raced the timer returns false.
    pub fn on_timer_fired(&mut self) -> bool {
        self.pending = false;
        self.stay_connected
    }

    pub fn stay_connected(&self) -> bool {
        self.stay_connected
    }

    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(3);

    fn armed() -> ReconnectScheduler {
        let mut scheduler = ReconnectScheduler::new(DELAY);
        scheduler.request_connect();
        scheduler
    }

    #[test]
    fn not_armed_until_a_connect_is_requested() {
        let mut scheduler = ReconnectScheduler::new(DELAY);
        assert_eq!(scheduler.on_session_closed(), None);
    }

    #[test]
    fn session_loss_schedules_one_attempt_after_the_fixed_delay() {
        let mut scheduler = armed();
        assert_eq!(scheduler.on_session_closed(), Some(DELAY));
        assert!(scheduler.pending());
    }

    #[test]
    fn a_second_loss_never_schedules_a_second_attempt() {
        let mut scheduler = armed();
        assert_eq!(scheduler.on_session_closed(), Some(DELAY));
        assert_eq!(scheduler.on_session_closed(), None);
        assert!(scheduler.pending());
    }

    #[test]
    fn timer_fire_clears_pending_for_the_next_loss() {
        let mut scheduler = armed();
        scheduler.on_session_closed();

        assert!(scheduler.on_timer_fired());
        assert!(!scheduler.pending());
        assert_eq!(scheduler.on_session_closed(), Some(DELAY));
    }

    #[test]
    fn shutdown_is_terminal_for_later_losses() {
        let mut scheduler = armed();
        scheduler.shutdown();
        assert_eq!(scheduler.on_session_closed(), None);
    }

    #[test]
    fn shutdown_reports_whether_a_timer_was_cancelled() {
        let mut scheduler = armed();
        scheduler.on_session_closed();
        assert!(scheduler.shutdown());
        assert!(!scheduler.shutdown());
    }

    #[test]
    fn timer_that_raced_a_shutdown_does_not_proceed() {
        let mut scheduler = armed();
        scheduler.on_session_closed();
        scheduler.shutdown();
        assert!(!scheduler.on_timer_fired());
    }

    #[test]
    fn an_explicit_connect_rearms_after_shutdown() {
        let mut scheduler = armed();
        scheduler.shutdown();
        scheduler.request_connect();
        assert_eq!(scheduler.on_session_closed(), Some(DELAY));
    }
}
