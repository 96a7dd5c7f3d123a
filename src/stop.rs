use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Advisory, cooperative stop signal shared by every agent of a simulation.
///
/// Raising it never retracts queued timers or registered rendezvous
/// requests; it only stops agents from starting new steps.
#[derive(Clone, Default)]
pub struct StopFlag {
    stopped: Arc<AtomicBool>,
}

impl fmt::Debug for StopFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopFlag")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleeps on the wall clock in short ticks.
    /// Returns false as soon as the flag is raised, true if the full duration elapsed.
    pub fn sleep_unless_stopped(&self, total: Duration) -> bool {
        let tick = Duration::from_millis(50);
        let mut slept = Duration::ZERO;
        while slept < total {
            if self.is_stopped() {
                return false;
            }
            let step = tick.min(total - slept);
            std::thread::sleep(step);
            slept += step;
        }
        !self.is_stopped()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = StopFlag::new();
        let other = flag.clone();
        assert!(!other.is_stopped());
        flag.stop();
        assert!(other.is_stopped());
    }

    #[test]
    fn sleep_returns_early_when_stopped() {
        let flag = StopFlag::new();
        flag.stop();
        assert!(!flag.sleep_unless_stopped(Duration::from_secs(10)));
    }

    #[test]
    fn sleep_completes_without_stop() {
        let flag = StopFlag::new();
        assert!(flag.sleep_unless_stopped(Duration::from_millis(1)));
    }
}
