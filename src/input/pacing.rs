//! Native-rate pacing for file and network sources

use std::time::Duration;

use crate::sync::{CancelToken, Clock};

/// Jumps larger than this are treated as discontinuities
const RESYNC_THRESHOLD: f64 = 1.0;
/// Gaps smaller than this are not worth sleeping for
const MIN_STEP: f64 = 0.1;

/// Holds frame delivery back to the rate their timestamps imply
#[derive(Debug, Default)]
pub struct NativeRatePacer {
    start: Option<Duration>,
    last_pts: f64,
    /// Media time accounted since `start`, seconds
    total: f64,
}

impl NativeRatePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep until the wall clock catches up with `pts_ms`.
    ///
    /// Returns false if cancelled while sleeping.
    pub fn pace(&mut self, pts_ms: i64, clock: &dyn Clock, cancel: &CancelToken) -> bool {
        let pts = pts_ms as f64 / 1e3;
        let Some(start) = self.start else {
            self.start = Some(clock.now());
            self.last_pts = pts;
            return true;
        };

        let diff = pts - self.last_pts;
        if !(-RESYNC_THRESHOLD..=RESYNC_THRESHOLD).contains(&diff) {
            tracing::debug!(from = self.last_pts, to = pts, "Pacer resync");
            self.last_pts = pts;
        } else if diff > MIN_STEP {
            self.last_pts = pts;
            self.total += diff;
            let elapsed = clock.now().saturating_sub(start).as_secs_f64();
            let wait = self.total - elapsed;
            if wait > 0.0 {
                return clock.sleep(Duration::from_secs_f64(wait), cancel);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ManualClock;

    #[test]
    fn test_small_steps_accumulate_only_past_threshold() {
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        let mut pacer = NativeRatePacer::new();
        pacer.pace(0, &clock, &cancel);
        pacer.pace(40, &clock, &cancel);
        pacer.pace(80, &clock, &cancel);
        assert_eq!(clock.now(), Duration::ZERO);
        pacer.pace(200, &clock, &cancel);
        assert_eq!(clock.now(), Duration::from_millis(200));
    }

    #[test]
    fn test_no_sleep_when_behind() {
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        let mut pacer = NativeRatePacer::new();
        pacer.pace(0, &clock, &cancel);
        clock.advance(Duration::from_millis(500));
        pacer.pace(200, &clock, &cancel);
        assert_eq!(clock.now(), Duration::from_millis(500));
    }

    #[test]
    fn test_jump_resyncs_without_sleeping() {
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        let mut pacer = NativeRatePacer::new();
        pacer.pace(0, &clock, &cancel);
        pacer.pace(5000, &clock, &cancel);
        assert_eq!(clock.now(), Duration::ZERO);
        pacer.pace(5200, &clock, &cancel);
        assert_eq!(clock.now(), Duration::from_millis(200));
    }

    #[test]
    fn test_cancelled_sleep() {
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        let mut pacer = NativeRatePacer::new();
        pacer.pace(0, &clock, &cancel);
        cancel.cancel();
        assert!(!pacer.pace(500, &clock, &cancel));
    }
}
