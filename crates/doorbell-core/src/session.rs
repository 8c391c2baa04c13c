//! Local projection of the engine's single active call
//!
//! [`CallSession`] is a small table-driven state machine. The engine remains
//! the source of truth; the session only follows the transitions below and
//! ignores anything else.
//!
//! ```text
//! Idle            --InboundArrived-->  InboundRinging
//! InboundRinging  --Admitted------->   Connected
//! InboundRinging  --Declined------->   Ended --> Idle
//! Idle            --InviteIssued--->   OutboundRinging
//! OutboundRinging --Terminated----->   Ended --> Idle
//! InboundRinging  --Terminated----->   Ended --> Idle
//! Connected       --Terminated----->   Ended --> Idle
//! ```
//!
//! `Ended` is transient: every transition into it is immediately followed by
//! the automatic reset to `Idle`, which clears the remote identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{CallId, CallNotification, EngineCallState};
use crate::error::{DoorbellError, DoorbellResult};

/// Session state
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    InboundRinging,
    OutboundRinging,
    Connected,
    Ended,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::InboundRinging => "InboundRinging",
            Self::OutboundRinging => "OutboundRinging",
            Self::Connected => "Connected",
            Self::Ended => "Ended",
        };
        f.write_str(name)
    }
}

/// Who placed the call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// How a call finished
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallOutcome {
    /// Engine reported a normal end
    Ended,
    /// Engine reported an error
    Failed,
    /// The doorbell declined the caller
    Declined,
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ended => "ended",
            Self::Failed => "encountered an error",
            Self::Declined => "was declined",
        };
        f.write_str(text)
    }
}

/// The call currently tracked by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCall {
    pub call_id: CallId,
    pub remote: String,
    pub direction: CallDirection,
}

/// Inputs that may move the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The engine announced an inbound call
    InboundArrived { call_id: CallId, caller: String },
    /// The trust gate accepted the pending inbound call
    Admitted,
    /// The trust gate declined the pending inbound call
    Declined,
    /// The orchestrator placed an outbound call
    InviteIssued { call_id: CallId, callee: String },
    /// The engine reported the call over
    Terminated { call_id: CallId, outcome: CallOutcome },
}

impl SessionEvent {
    /// Map an engine notification onto a session event
    ///
    /// Returns `None` for notifications that only matter for diagnostics
    /// (progress, connected, streams running, released).
    pub fn from_notification(notification: &CallNotification) -> Option<Self> {
        match notification.state {
            EngineCallState::IncomingReceived => Some(Self::InboundArrived {
                call_id: notification.call_id,
                caller: notification.remote.clone(),
            }),
            EngineCallState::End => Some(Self::Terminated {
                call_id: notification.call_id,
                outcome: CallOutcome::Ended,
            }),
            EngineCallState::Error => Some(Self::Terminated {
                call_id: notification.call_id,
                outcome: CallOutcome::Failed,
            }),
            _ => None,
        }
    }
}

/// A single state change
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Transition {
    pub from: CallState,
    pub to: CallState,
}

/// At most one call, tracked from the engine's notifications
#[derive(Debug, Clone)]
pub struct CallSession {
    state: CallState,
    call: Option<ActiveCall>,
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            state: CallState::Idle,
            call: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CallState::Idle
    }

    /// The tracked call, if any
    pub fn active_call(&self) -> Option<&ActiveCall> {
        self.call.as_ref()
    }

    /// Remote identity of the tracked call
    pub fn remote_identity(&self) -> Option<&str> {
        self.call.as_ref().map(|call| call.remote.as_str())
    }

    pub fn direction(&self) -> Option<CallDirection> {
        self.call.as_ref().map(|call| call.direction)
    }

    /// Apply `event` and return the transitions it caused
    ///
    /// An empty vector means the event is not in the transition table for the
    /// current state (or refers to another call) and nothing changed.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Transition> {
        match (self.state, event) {
            (CallState::Idle, SessionEvent::InboundArrived { call_id, caller }) => {
                self.call = Some(ActiveCall {
                    call_id,
                    remote: caller,
                    direction: CallDirection::Inbound,
                });
                vec![self.move_to(CallState::InboundRinging)]
            }
            (CallState::InboundRinging, SessionEvent::Admitted) => {
                vec![self.move_to(CallState::Connected)]
            }
            (CallState::InboundRinging, SessionEvent::Declined) => self.finish(),
            (CallState::Idle, SessionEvent::InviteIssued { call_id, callee }) => {
                self.call = Some(ActiveCall {
                    call_id,
                    remote: callee,
                    direction: CallDirection::Outbound,
                });
                vec![self.move_to(CallState::OutboundRinging)]
            }
            (
                CallState::InboundRinging | CallState::OutboundRinging | CallState::Connected,
                SessionEvent::Terminated { call_id, .. },
            ) if self.tracks(call_id) => self.finish(),
            _ => Vec::new(),
        }
    }

    /// Record an outbound call placed by the orchestrator
    ///
    /// Unlike [`CallSession::handle`], refusing here is an error: the caller
    /// asked for something the invariants forbid.
    pub fn begin_outbound(&mut self, call_id: CallId, callee: impl Into<String>) -> DoorbellResult<Transition> {
        if !self.is_idle() {
            return Err(DoorbellError::invalid_state(format!(
                "cannot place an outbound call while session is {}",
                self.state
            )));
        }
        let mut transitions = self.handle(SessionEvent::InviteIssued {
            call_id,
            callee: callee.into(),
        });
        transitions
            .pop()
            .ok_or_else(|| DoorbellError::invalid_state("outbound transition rejected"))
    }

    /// Drop whatever is tracked and return to `Idle`
    pub fn reset(&mut self) {
        self.state = CallState::Idle;
        self.call = None;
    }

    fn tracks(&self, call_id: CallId) -> bool {
        self.call.as_ref().is_some_and(|call| call.call_id == call_id)
    }

    fn move_to(&mut self, to: CallState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }

    fn finish(&mut self) -> Vec<Transition> {
        let ended = self.move_to(CallState::Ended);
        self.call = None;
        let reset = self.move_to(CallState::Idle);
        vec![ended, reset]
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}
