//! Button self-test
//!
//! Exercises the button wiring and the ring cue without any SIP: every press
//! prints a timestamped line and plays the clip.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use doorbell_core::{DoorbellResult, DoorbellTrigger, InputPin, Intent, RingCue};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One detected press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Press {
    /// Press number, starting at 0
    pub count: u64,
    pub at: DateTime<Local>,
}

impl fmt::Display for Press {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: Button pressed #{}", self.at.format("%Y-%m-%d %H:%M:%S"), self.count)
    }
}

pub struct ButtonTest {
    pin: Box<dyn InputPin>,
    trigger: DoorbellTrigger,
    cue: Option<RingCue>,
    presses: u64,
}

impl ButtonTest {
    pub fn new(pin: Box<dyn InputPin>, quiet_interval: Duration, cue: Option<RingCue>) -> Self {
        Self {
            pin,
            trigger: DoorbellTrigger::new(quiet_interval),
            cue,
            presses: 0,
        }
    }

    pub fn presses(&self) -> u64 {
        self.presses
    }

    /// Sample the button once; returns the press if a new one started
    pub async fn step(&mut self, now: Instant) -> DoorbellResult<Option<Press>> {
        self.collect_cue().await;

        let level = self.pin.read_level()?;
        if self.trigger.sample(level, now, false) != Intent::Ring {
            return Ok(None);
        }

        let press = Press {
            count: self.presses,
            at: Local::now(),
        };
        self.presses += 1;

        if let Some(cue) = self.cue.as_mut() {
            cue.start();
        }
        debug!(count = press.count, "Button press detected");
        Ok(Some(press))
    }

    /// Poll until `shutdown`, printing each press; returns the press count
    pub async fn run(mut self, poll_interval: Duration, shutdown: CancellationToken) -> u64 {
        println!("Press the doorbell button (pin {}); Ctrl+C to stop.", self.pin.pin());

        while !shutdown.is_cancelled() {
            match self.step(Instant::now()).await {
                Ok(Some(press)) => println!("{}", press),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Button read failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        if let Some(cue) = self.cue.as_mut() {
            cue.detach();
        }
        self.presses
    }

    async fn collect_cue(&mut self) {
        let Some(cue) = self.cue.as_mut() else {
            return;
        };
        if let Some(Err(e)) = cue.poll().await {
            warn!(error = %e, clip = %cue.clip().display(), "Ring cue failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use doorbell_core::sim::{RecordingCuePlayer, ScriptedPin};

    const CLIP: &str = "/home/pi/SmartDoorbell/Ding-dong.wav";

    async fn settle(test: &mut ButtonTest, player: &RecordingCuePlayer, plays: usize) {
        for _ in 0..200 {
            if player.plays().len() == plays && !test.cue.as_ref().is_some_and(RingCue::is_playing) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        test.collect_cue().await;
    }

    fn rig(quiet: Duration) -> (ButtonTest, ScriptedPin, RecordingCuePlayer) {
        let pin = ScriptedPin::new(17);
        let player = RecordingCuePlayer::new();
        let cue = RingCue::new(Arc::new(player.clone()), CLIP);
        let test = ButtonTest::new(Box::new(pin.clone()), quiet, Some(cue));
        (test, pin, player)
    }

    #[tokio::test]
    async fn test_each_press_is_counted_once_and_rings() {
        let (mut test, pin, player) = rig(Duration::ZERO);
        let start = Instant::now();

        assert_eq!(test.step(start).await.unwrap(), None);

        pin.press();
        let first = test.step(start).await.unwrap().expect("press detected");
        assert_eq!(first.count, 0);
        for _ in 0..5 {
            assert_eq!(test.step(start).await.unwrap(), None, "holding is one press");
        }

        settle(&mut test, &player, 1).await;

        pin.release();
        test.step(start).await.unwrap();
        pin.press();
        let second = test.step(start).await.unwrap().expect("second press detected");
        assert_eq!(second.count, 1);
        assert_eq!(test.presses(), 2);

        settle(&mut test, &player, 2).await;
        assert_eq!(player.plays(), vec![PathBuf::from(CLIP), PathBuf::from(CLIP)]);
    }

    #[tokio::test]
    async fn test_bounce_inside_quiet_window_is_ignored() {
        let (mut test, pin, _player) = rig(Duration::from_millis(200));
        let start = Instant::now();

        pin.press();
        assert!(test.step(start).await.unwrap().is_some());
        pin.release();
        test.step(start + Duration::from_millis(10)).await.unwrap();
        pin.press();
        assert_eq!(test.step(start + Duration::from_millis(20)).await.unwrap(), None);
        assert_eq!(test.presses(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_is_reported_and_recoverable() {
        let (mut test, pin, _player) = rig(Duration::ZERO);
        pin.break_line("unplugged");
        assert!(test.step(Instant::now()).await.is_err());

        pin.press();
        assert!(test.step(Instant::now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let (test, _pin, _player) = rig(Duration::ZERO);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert_eq!(test.run(Duration::from_millis(1), shutdown).await, 0);
    }

    #[test]
    fn test_press_line_format() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Local, 2024, 5, 1, 7, 30, 9).unwrap();
        let press = Press { count: 3, at };
        assert_eq!(press.to_string(), "2024-05-01 07:30:09: Button pressed #3");
    }
}
