//! Button press detection with an explicit debounce window
//!
//! [`DoorbellTrigger`] turns a stream of sampled input levels into at most one
//! [`Intent::Ring`] per physical press. After a press it waits for the line to
//! be released and to stay quiet for the configured interval before it arms
//! again, independent of how often it is sampled.

use std::time::Duration;

use tokio::time::Instant;

use crate::input::Level;

/// Default quiet window after a release before the button re-arms
pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_millis(200);

/// What the orchestrator should do after a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Nothing to do
    None,
    /// A fresh press while no call is active: place the doorbell call
    Ring,
    /// A fresh press arrived during a call and was swallowed
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Released and quiet; the next press rings
    Armed,
    /// Press consumed; waiting for release
    Latched,
    /// Released at the given instant; waiting out the quiet window
    Settling { released_at: Instant },
}

/// Edge detector and debouncer for the doorbell button
#[derive(Debug, Clone)]
pub struct DoorbellTrigger {
    quiet_interval: Duration,
    phase: Phase,
}

impl DoorbellTrigger {
    pub fn new(quiet_interval: Duration) -> Self {
        Self {
            quiet_interval,
            phase: Phase::Armed,
        }
    }

    pub fn quiet_interval(&self) -> Duration {
        self.quiet_interval
    }

    /// Whether the next press would be treated as a new one
    pub fn is_armed(&self) -> bool {
        self.phase == Phase::Armed
    }

    /// Feed one sample taken at `now`
    ///
    /// `call_active` must be true whenever the session is not idle or the
    /// engine reports a call in progress; a press seen then is consumed
    /// without ringing.
    pub fn sample(&mut self, level: Level, now: Instant, call_active: bool) -> Intent {
        let fresh_press = match (self.phase, level) {
            (Phase::Armed, Level::Asserted) => true,
            (Phase::Armed, Level::Released) => false,
            (Phase::Latched, Level::Asserted) => false,
            (Phase::Latched, Level::Released) => {
                self.settle(now, now);
                false
            }
            (Phase::Settling { released_at }, Level::Asserted) => {
                // a press inside the quiet window is contact bounce
                now.saturating_duration_since(released_at) >= self.quiet_interval
            }
            (Phase::Settling { released_at }, Level::Released) => {
                self.settle(released_at, now);
                false
            }
        };

        if !fresh_press {
            if level == Level::Asserted {
                self.phase = Phase::Latched;
            }
            return Intent::None;
        }

        self.phase = Phase::Latched;
        if call_active {
            Intent::Suppressed
        } else {
            Intent::Ring
        }
    }

    fn settle(&mut self, released_at: Instant, now: Instant) {
        self.phase = if now.saturating_duration_since(released_at) >= self.quiet_interval {
            Phase::Armed
        } else {
            Phase::Settling { released_at }
        };
    }
}

impl Default for DoorbellTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const POLL: Duration = Duration::from_millis(30);

    fn run(trigger: &mut DoorbellTrigger, start: Instant, levels: &[Level], call_active: bool) -> Vec<Intent> {
        levels
            .iter()
            .enumerate()
            .map(|(i, level)| trigger.sample(*level, start + POLL * i as u32, call_active))
            .collect()
    }

    fn rings(intents: &[Intent]) -> usize {
        intents.iter().filter(|i| **i == Intent::Ring).count()
    }

    #[test]
    fn test_single_ring_while_held() {
        let mut trigger = DoorbellTrigger::default();
        let mut levels = vec![Level::Released];
        levels.extend(std::iter::repeat(Level::Asserted).take(50));
        let intents = run(&mut trigger, Instant::now(), &levels, false);
        assert_eq!(intents[1], Intent::Ring);
        assert_eq!(rings(&intents), 1);
    }

    #[test]
    fn test_rearms_after_quiet_release() {
        let mut trigger = DoorbellTrigger::new(Duration::from_millis(100));
        let start = Instant::now();
        use Level::*;
        // press, release for 5 polls (150ms), press again
        let levels = [Asserted, Asserted, Released, Released, Released, Released, Released, Asserted];
        let intents = run(&mut trigger, start, &levels, false);
        assert_eq!(intents[0], Intent::Ring);
        assert_eq!(intents[7], Intent::Ring);
        assert_eq!(rings(&intents), 2);
    }

    #[test]
    fn test_bounce_inside_quiet_window_is_ignored() {
        let mut trigger = DoorbellTrigger::new(Duration::from_millis(200));
        use Level::*;
        let levels = [Asserted, Released, Asserted, Released, Asserted, Released];
        let intents = run(&mut trigger, Instant::now(), &levels, false);
        assert_eq!(rings(&intents), 1);
        assert!(!trigger.is_armed());
    }

    #[test]
    fn test_zero_quiet_interval_rearms_on_release() {
        let mut trigger = DoorbellTrigger::new(Duration::ZERO);
        use Level::*;
        let intents = run(&mut trigger, Instant::now(), &[Asserted, Released, Asserted], false);
        assert_eq!(intents, vec![Intent::Ring, Intent::None, Intent::Ring]);
    }

    #[test]
    fn test_press_during_call_is_suppressed_and_consumed() {
        let mut trigger = DoorbellTrigger::default();
        let start = Instant::now();
        assert_eq!(trigger.sample(Level::Asserted, start, true), Intent::Suppressed);
        // call ends while the button is still held: no ring
        assert_eq!(trigger.sample(Level::Asserted, start + POLL, false), Intent::None);
        assert_eq!(trigger.sample(Level::Asserted, start + POLL * 2, false), Intent::None);
    }

    #[test]
    fn test_slow_sampling_counts_as_new_press() {
        let mut trigger = DoorbellTrigger::new(Duration::from_millis(200));
        let start = Instant::now();
        assert_eq!(trigger.sample(Level::Asserted, start, false), Intent::Ring);
        trigger.sample(Level::Released, start + Duration::from_millis(50), false);
        assert_eq!(
            trigger.sample(Level::Asserted, start + Duration::from_millis(400), false),
            Intent::Ring
        );
    }

    fn level_strategy() -> impl Strategy<Value = Vec<(bool, u64)>> {
        prop::collection::vec((any::<bool>(), 1u64..120), 1..200)
    }

    proptest! {
        #[test]
        fn at_most_one_ring_per_press_cycle(samples in level_strategy()) {
            let mut trigger = DoorbellTrigger::new(Duration::from_millis(50));
            let mut now = Instant::now();
            let mut previous = Level::Released;
            let mut rings_this_press = 0;

            for (pressed, gap_ms) in samples {
                now += Duration::from_millis(gap_ms);
                let level = if pressed { Level::Asserted } else { Level::Released };
                if previous == Level::Released && level == Level::Asserted {
                    rings_this_press = 0;
                }
                if trigger.sample(level, now, false) == Intent::Ring {
                    rings_this_press += 1;
                    prop_assert_eq!(level, Level::Asserted);
                }
                prop_assert!(rings_this_press <= 1);
                previous = level;
            }
        }

        #[test]
        fn never_rings_during_a_call(samples in level_strategy()) {
            let mut trigger = DoorbellTrigger::default();
            let mut now = Instant::now();
            for (pressed, gap_ms) in samples {
                now += Duration::from_millis(gap_ms);
                let level = if pressed { Level::Asserted } else { Level::Released };
                prop_assert_ne!(trigger.sample(level, now, true), Intent::Ring);
            }
        }
    }
}
