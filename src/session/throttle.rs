//! Rate limiter between a session and its consumers.
//!
//! Live (not-yet-closed) kline ticks are delivered at most once per window;
//! skipped ticks are simply superseded by the next delivered one, since only
//! the latest live price matters. Closed-boundary events (a kline closing, any
//! liquidation) bypass the window entirely and are delivered immediately.

use std::time::Duration;
use tokio::time::Instant;

/// Default minimum spacing between non-critical update deliveries.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(500);

/// Per-session update throttle.
#[derive(Debug)]
pub struct UpdateThrottle {
    window: Duration,
    last_emit: Option<Instant>,
}

impl UpdateThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
        }
    }

    /// Decide whether an update may be delivered now.
    ///
    /// Critical updates are always admitted and do not consume the window, so
    /// a boundary event never starves the next live tick.
    pub fn admit(&mut self, critical: bool) -> bool {
        self.admit_at(critical, Instant::now())
    }

    pub fn admit_at(&mut self, critical: bool, now: Instant) -> bool {
        if critical {
            return true;
        }
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

impl Default for UpdateThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_update_admitted() {
        let mut throttle = UpdateThrottle::default();
        assert!(throttle.admit_at(false, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_twenty_admits_at_most_two_per_second() {
        let mut throttle = UpdateThrottle::default();
        let start = Instant::now();

        // 20 live updates spread over 1 second (50ms apart)
        let admitted = (0..20u64)
            .filter(|index| {
                throttle.admit_at(false, start + Duration::from_millis(index * 50))
            })
            .count();

        assert_eq!(admitted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_bypasses_window() {
        let mut throttle = UpdateThrottle::default();
        let start = Instant::now();

        assert!(throttle.admit_at(false, start));
        // Inside the window: live suppressed, critical delivered
        assert!(!throttle.admit_at(false, start + Duration::from_millis(100)));
        assert!(throttle.admit_at(true, start + Duration::from_millis(100)));
        assert!(throttle.admit_at(true, start + Duration::from_millis(101)));
        // Critical deliveries do not consume the window
        assert!(throttle.admit_at(false, start + Duration::from_millis(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reopens_after_spacing() {
        let mut throttle = UpdateThrottle::new(Duration::from_millis(500));
        let start = Instant::now();

        assert!(throttle.admit_at(false, start));
        assert!(!throttle.admit_at(false, start + Duration::from_millis(499)));
        assert!(throttle.admit_at(false, start + Duration::from_millis(500)));
    }
}
