//! Event stream and counters for the doorbell
//!
//! The orchestrator publishes a [`DoorbellEvent`] for everything an observer
//! might care about (button presses, admission decisions, call endings, cue
//! playback). Subscribers receive them over a `tokio::sync::broadcast`
//! channel; slow subscribers lose old events rather than blocking the loop.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::engine::{CallId, EngineCallState};
use crate::session::CallOutcome;

/// Capacity of the broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something that happened in the doorbell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoorbellEvent {
    /// A fresh button press placed (or tried to place) a call
    ButtonPressed {
        /// Press number since startup, starting at 0
        count: u64,
    },
    /// A press arrived during a call and was ignored
    PressIgnored,
    /// The doorbell called the owner
    OutboundCallPlaced { call_id: CallId, callee: String },
    /// A trusted caller was let in
    InboundAdmitted { call_id: CallId, caller: String },
    /// An untrusted caller was turned away
    InboundDeclined { call_id: CallId, caller: String },
    /// The owner received the untrusted-caller notice
    OwnerNotified { recipient: String, caller: String },
    /// The untrusted-caller notice could not be sent
    NotificationFailed { recipient: String, reason: String },
    /// Engine notification that did not move the session
    CallStateObserved { call_id: CallId, state: EngineCallState },
    /// The tracked call is over and the session is idle again
    CallEnded { call_id: CallId, outcome: CallOutcome },
    /// The ring cue finished playing
    CueFinished { clip: PathBuf, ok: bool },
    /// The run loop is exiting
    ShuttingDown,
}

/// Event with the wall-clock time it was published
#[derive(Debug, Clone)]
pub struct TimedEvent {
    pub timestamp: DateTime<Utc>,
    pub event: DoorbellEvent,
}

/// Broadcast publisher owned by the orchestrator
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TimedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.tx.subscribe()
    }

    /// Publish `event`; having no subscribers is fine
    pub fn publish(&self, event: DoorbellEvent) {
        let _ = self.tx.send(TimedEvent {
            timestamp: Utc::now(),
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Running totals since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorbellStats {
    /// Loop iterations completed
    pub iterations: u64,
    /// Fresh button presses (including ignored ones)
    pub presses: u64,
    /// Outbound calls placed
    pub invites: u64,
    /// Inbound calls accepted
    pub admitted: u64,
    /// Inbound calls declined
    pub declined: u64,
    /// Owner notices that could not be sent
    pub notification_failures: u64,
    /// Calls that ended normally
    pub calls_ended: u64,
    /// Calls that ended in an engine error
    pub call_errors: u64,
    /// Ring cue playbacks started
    pub cues_played: u64,
    /// Runtime errors logged and contained inside an iteration
    pub contained_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.publish(DoorbellEvent::ShuttingDown);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(DoorbellEvent::ButtonPressed { count: 0 });
        bus.publish(DoorbellEvent::PressIgnored);

        assert_eq!(rx.recv().await.unwrap().event, DoorbellEvent::ButtonPressed { count: 0 });
        assert_eq!(rx.recv().await.unwrap().event, DoorbellEvent::PressIgnored);
    }
}
