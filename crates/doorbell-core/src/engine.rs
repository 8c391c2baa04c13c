//! Signaling engine contract
//!
//! The SIP/media stack that actually places and answers calls lives outside
//! this crate. The orchestrator talks to it only through [`SignalingEngine`].
//! Call-state notifications are returned from
//! [`SignalingEngine::process_events`] in the order the engine produced them,
//! so they are handled inside the same loop iteration that pumped the engine.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DoorbellResult;

/// Engine-assigned call identifier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallId(pub uuid::Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call states reported by the engine
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EngineCallState {
    /// A remote party is calling the device
    IncomingReceived,
    /// An outgoing INVITE is in flight
    OutgoingProgress,
    /// The callee is being alerted
    OutgoingRinging,
    /// The call was answered
    Connected,
    /// Media streams are flowing
    StreamsRunning,
    /// The call ended normally
    End,
    /// The call failed
    Error,
    /// The engine released its resources for the call
    Released,
}

impl fmt::Display for EngineCallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IncomingReceived => "IncomingReceived",
            Self::OutgoingProgress => "OutgoingProgress",
            Self::OutgoingRinging => "OutgoingRinging",
            Self::Connected => "Connected",
            Self::StreamsRunning => "StreamsRunning",
            Self::End => "End",
            Self::Error => "Error",
            Self::Released => "Released",
        };
        f.write_str(name)
    }
}

/// A call-state change delivered by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallNotification {
    /// Call the notification refers to
    pub call_id: CallId,
    /// Remote party address (URI only)
    pub remote: String,
    /// New engine state
    pub state: EngineCallState,
    /// Optional engine-provided detail (error reason, ...)
    pub message: Option<String>,
}

impl CallNotification {
    pub fn new(call_id: CallId, remote: impl Into<String>, state: EngineCallState) -> Self {
        Self {
            call_id,
            remote: remote.into(),
            state,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Reason given to the remote side when declining a call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum DeclineReason {
    /// Caller is not trusted
    Declined,
    /// Device already has a call
    Busy,
}

/// Operations the doorbell needs from a SIP/media engine
///
/// Implementations are expected to be configured for at most one concurrent
/// call and to reject extra inbound calls themselves.
#[async_trait]
pub trait SignalingEngine: Send {
    /// Let the engine make progress and collect the notifications it produced
    async fn process_events(&mut self) -> DoorbellResult<Vec<CallNotification>>;

    /// Place an outbound call
    async fn invite(&mut self, address: &str) -> DoorbellResult<CallId>;

    /// Answer an inbound call
    async fn accept_call(&mut self, call: CallId) -> DoorbellResult<()>;

    /// Refuse an inbound call
    async fn decline_call(&mut self, call: CallId, reason: DeclineReason) -> DoorbellResult<()>;

    /// Hang up every call the engine knows about
    async fn terminate_all_calls(&mut self) -> DoorbellResult<()>;

    /// Whether the engine currently has a call in progress
    fn is_in_call(&self) -> bool;

    /// Send a text message to `address`
    async fn send_message(&mut self, address: &str, text: &str) -> DoorbellResult<()>;
}
