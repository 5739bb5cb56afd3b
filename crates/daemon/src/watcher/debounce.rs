// Commit debouncer: coalesces a burst of change events into one cycle.
//
// Two deadlines are tracked per window:
//   debounce  = last event + debounce   (moved by every event)
//   max-wait  = first event + max-wait  (set once when the window opens)
// The window is ready when the earlier of the two has passed.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    first_event_at: Instant,
    last_event_at: Instant,
}

#[derive(Debug, Clone)]
pub struct CommitDebouncer {
    debounce: Duration,
    max_wait: Duration,
    window: Option<Window>,
    pending: BTreeSet<String>,
}

impl CommitDebouncer {
    pub fn new(debounce: Duration, max_wait: Duration) -> Self {
        Self { debounce, max_wait: max_wait.max(debounce), window: None, pending: BTreeSet::new() }
    }

    /// Change timings for later deadlines (config reload). An open window keeps
    /// its anchors.
    pub fn set_timing(&mut self, debounce: Duration, max_wait: Duration) {
        self.debounce = debounce;
        self.max_wait = max_wait.max(debounce);
    }

    /// Record an event observed at `observed_at`. Events delivered late never
    /// move the debounce anchor backwards.
    pub fn push(&mut self, path: impl Into<String>, observed_at: Instant) {
        self.pending.insert(path.into());
        match &mut self.window {
            Some(window) => window.last_event_at = window.last_event_at.max(observed_at),
            None => {
                self.window = Some(Window { first_event_at: observed_at, last_event_at: observed_at })
            }
        }
    }

    /// When the current window becomes ready, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.window.map(|window| {
            (window.last_event_at + self.debounce).min(window.first_event_at + self.max_wait)
        })
    }

    /// Close the window unconditionally, clearing both deadlines.
    pub fn take(&mut self) -> Vec<String> {
        self.window = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Distinct paths seen in the open window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEBOUNCE: Duration = Duration::from_secs(20);
    const MAX_WAIT: Duration = Duration::from_secs(120);

    fn debouncer() -> CommitDebouncer {
        CommitDebouncer::new(DEBOUNCE, MAX_WAIT)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    impl CommitDebouncer {
        fn is_ready_at(&self, now: Instant) -> bool {
            self.deadline().is_some_and(|deadline| now >= deadline)
        }

        fn take_if_ready_at(&mut self, now: Instant) -> Option<Vec<String>> {
            if self.is_ready_at(now) {
                Some(self.take())
            } else {
                None
            }
        }

        fn is_open(&self) -> bool {
            self.window.is_some()
        }
    }

    // ── Single window ──────────────────────────────────────────────

    #[test]
    fn empty_debouncer_has_no_deadline() {
        let debouncer = debouncer();
        assert!(debouncer.deadline().is_none());
        assert!(!debouncer.is_ready_at(Instant::now()));
    }

    #[test]
    fn single_event_is_ready_after_debounce() {
        let mut debouncer = debouncer();
        let now = Instant::now();

        debouncer.push("a.txt", now);

        assert_eq!(debouncer.deadline(), Some(now + DEBOUNCE));
        assert!(debouncer.take_if_ready_at(now + secs(19)).is_none());
        assert_eq!(debouncer.take_if_ready_at(now + DEBOUNCE), Some(vec!["a.txt".to_string()]));
        assert!(!debouncer.is_open());
    }

    #[test]
    fn later_event_moves_debounce_but_not_max_wait() {
        let mut debouncer = debouncer();
        let now = Instant::now();

        debouncer.push("a.txt", now);
        debouncer.push("b.txt", now + secs(15));

        assert_eq!(debouncer.deadline(), Some(now + secs(35)));
        assert!(debouncer.take_if_ready_at(now + secs(30)).is_none());
        assert_eq!(debouncer.pending_count(), 2);
    }

    #[test]
    fn max_wait_caps_continuous_editing() {
        let mut debouncer = debouncer();
        let now = Instant::now();

        for step in 0..=12 {
            debouncer.push("a.txt", now + secs(step * 10));
        }

        assert_eq!(debouncer.deadline(), Some(now + MAX_WAIT));
        assert!(debouncer.is_ready_at(now + MAX_WAIT));
    }

    #[test]
    fn repeated_path_is_reported_once() {
        let mut debouncer = debouncer();
        let now = Instant::now();

        debouncer.push("a.txt", now);
        debouncer.push("a.txt", now + secs(1));

        assert_eq!(debouncer.take(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn take_clears_both_deadlines_and_next_event_opens_new_window() {
        let mut debouncer = debouncer();
        let now = Instant::now();

        debouncer.push("a.txt", now);
        debouncer.take();
        assert!(debouncer.deadline().is_none());

        debouncer.push("b.txt", now + secs(100));
        assert_eq!(debouncer.deadline(), Some(now + secs(120)));
    }

    #[test]
    fn max_wait_never_shorter_than_debounce() {
        let mut debouncer = CommitDebouncer::new(secs(30), secs(10));
        let now = Instant::now();
        debouncer.push("a.txt", now);
        assert_eq!(debouncer.deadline(), Some(now + secs(30)));
    }

    #[test]
    fn set_timing_keeps_window_anchors() {
        let mut debouncer = debouncer();
        let now = Instant::now();
        debouncer.push("a.txt", now);

        debouncer.set_timing(secs(5), secs(60));

        assert_eq!(debouncer.deadline(), Some(now + secs(5)));
    }

    #[test]
    fn window_is_anchored_at_observation_time_not_delivery_time() {
        let mut debouncer = debouncer();
        let observed = Instant::now();

        // Delivered 5s after the OS saw it.
        debouncer.push("a.txt", observed);
        assert_eq!(debouncer.deadline(), Some(observed + DEBOUNCE));

        // An older event delivered out of order does not pull the deadline in.
        debouncer.push("b.txt", observed + secs(10));
        debouncer.push("c.txt", observed + secs(4));
        assert_eq!(debouncer.deadline(), Some(observed + secs(30)));
    }

    // ── Properties ─────────────────────────────────────────────────

    /// Replay events at `offsets` (seconds), firing whenever a deadline has
    /// passed before the next event, and once more after the last event.
    /// Returns the fire times as offsets.
    fn simulate(offsets: &[u64], debounce: u64, max_wait: u64) -> Vec<u64> {
        let start = Instant::now();
        let mut debouncer = CommitDebouncer::new(secs(debounce), secs(max_wait));
        let mut fires = Vec::new();

        for &offset in offsets {
            let at = start + secs(offset);
            while let Some(deadline) = debouncer.deadline().filter(|deadline| *deadline <= at) {
                debouncer.take();
                fires.push((deadline - start).as_secs());
            }
            debouncer.push("file.txt", at);
        }
        if let Some(deadline) = debouncer.deadline() {
            debouncer.take();
            fires.push((deadline - start).as_secs());
        }
        fires
    }

    fn offsets_from_gaps(gaps: &[u64]) -> Vec<u64> {
        let mut offsets = vec![0];
        for gap in gaps {
            let last = *offsets.last().unwrap_or(&0);
            offsets.push(last + gap);
        }
        offsets
    }

    proptest! {
        #[test]
        fn burst_inside_max_wait_fires_once_after_last_event(
            debounce in 2u64..30,
            gaps in prop::collection::vec(0u64..30, 0..20),
        ) {
            let gaps: Vec<u64> = gaps.into_iter().map(|gap| gap % debounce).collect();
            let offsets = offsets_from_gaps(&gaps);
            let last = *offsets.last().unwrap();
            let max_wait = last + debounce + 1;

            let fires = simulate(&offsets, debounce, max_wait);

            prop_assert_eq!(fires, vec![last + debounce]);
        }

        #[test]
        fn continuous_editing_fires_at_max_wait(
            debounce in 2u64..10,
            max_wait in 10u64..60,
            extra in 1u64..50,
        ) {
            // One event per second until well past the max-wait deadline.
            let offsets: Vec<u64> = (0..=max_wait + extra).collect();

            let fires = simulate(&offsets, debounce, max_wait);

            prop_assert_eq!(fires[0], max_wait);
            prop_assert!(fires.windows(2).all(|pair| pair[1] > pair[0]));
        }
    }
}
