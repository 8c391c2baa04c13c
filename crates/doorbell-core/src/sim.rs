//! In-memory collaborators for tests and bench runs
//!
//! These stand in for the SIP engine, the GPIO line and the audio player so
//! the orchestrator can be exercised without hardware or a network. Every
//! type is a cheap clonable handle over shared state: keep one clone inside
//! the orchestrator and drive or inspect the other.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::EngineSettings;
use crate::cue::CuePlayer;
use crate::engine::{CallId, CallNotification, DeclineReason, EngineCallState, SignalingEngine};
use crate::error::{DoorbellError, DoorbellResult};
use crate::input::{InputPin, Level};
use crate::session::CallDirection;

#[derive(Debug, Clone)]
struct SimCall {
    call_id: CallId,
    remote: String,
    direction: CallDirection,
}

#[derive(Debug, Default)]
struct EngineState {
    pending: VecDeque<CallNotification>,
    active: Option<SimCall>,
    invites: Vec<String>,
    accepted: Vec<CallId>,
    declined: Vec<(CallId, DeclineReason)>,
    messages: Vec<(String, String)>,
    terminate_all_count: usize,
    process_count: usize,
    fail_invites: bool,
    fail_messages: bool,
    fail_accept: bool,
    fail_decline: bool,
    fail_terminate: bool,
}

impl EngineState {
    fn push(&mut self, call: &SimCall, state: EngineCallState) {
        self.pending
            .push_back(CallNotification::new(call.call_id, call.remote.clone(), state));
    }

    fn end_active(&mut self, state: EngineCallState, message: Option<String>) -> bool {
        let Some(call) = self.active.take() else {
            return false;
        };
        let mut notification = CallNotification::new(call.call_id, call.remote.clone(), state);
        notification.message = message;
        self.pending.push_back(notification);
        self.push(&call, EngineCallState::Released);
        true
    }
}

/// Signaling engine with a single call slot and scripted remote parties
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    settings: Arc<EngineSettings>,
    state: Arc<Mutex<EngineState>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine standing in for the account described by `settings`
    pub fn with_settings(settings: EngineSettings) -> Self {
        debug!(identity = ?settings.identity, server = ?settings.server, "Simulated engine configured");
        Self {
            settings: Arc::new(settings),
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// SIP identity the doorbell presents, `None` when unconfigured
    pub fn identity(&self) -> Option<&str> {
        self.settings.identity.as_deref()
    }

    /// A remote party calls the device
    ///
    /// While another call is active the engine turns the caller away itself
    /// with [`DeclineReason::Busy`], as a one-call engine would.
    pub fn incoming_call(&self, caller: impl Into<String>) -> CallId {
        let mut state = self.state.lock();
        let call = SimCall {
            call_id: CallId::new(),
            remote: caller.into(),
            direction: CallDirection::Inbound,
        };

        if state.active.is_some() {
            debug!(caller = %call.remote, "Simulated engine busy; rejecting second call");
            state.declined.push((call.call_id, DeclineReason::Busy));
            state.push(&call, EngineCallState::End);
            return call.call_id;
        }

        state.push(&call, EngineCallState::IncomingReceived);
        let call_id = call.call_id;
        state.active = Some(call);
        call_id
    }

    /// The owner picks up the doorbell's outbound call
    pub fn remote_answer(&self) -> bool {
        let mut state = self.state.lock();
        let Some(call) = state.active.clone() else {
            return false;
        };
        if call.direction != CallDirection::Outbound {
            return false;
        }
        state.push(&call, EngineCallState::Connected);
        state.push(&call, EngineCallState::StreamsRunning);
        true
    }

    /// The remote party hangs up
    pub fn remote_hangup(&self) -> bool {
        self.state.lock().end_active(EngineCallState::End, None)
    }

    /// The active call fails inside the engine
    pub fn fail_active_call(&self, reason: impl Into<String>) -> bool {
        self.state
            .lock()
            .end_active(EngineCallState::Error, Some(reason.into()))
    }

    /// Queue an arbitrary notification
    pub fn inject(&self, notification: CallNotification) {
        self.state.lock().pending.push_back(notification);
    }

    pub fn set_fail_invites(&self, fail: bool) {
        self.state.lock().fail_invites = fail;
    }

    pub fn set_fail_messages(&self, fail: bool) {
        self.state.lock().fail_messages = fail;
    }

    /// Reject `accept_call`; the call keeps ringing
    pub fn set_fail_accept(&self, fail: bool) {
        self.state.lock().fail_accept = fail;
    }

    /// Reject `decline_call`; the call is left up
    pub fn set_fail_decline(&self, fail: bool) {
        self.state.lock().fail_decline = fail;
    }

    /// Fail `terminate_all_calls` after counting it; active calls stay up
    pub fn set_fail_terminate(&self, fail: bool) {
        self.state.lock().fail_terminate = fail;
    }

    /// Addresses invited so far
    pub fn invites(&self) -> Vec<String> {
        self.state.lock().invites.clone()
    }

    pub fn accepted(&self) -> Vec<CallId> {
        self.state.lock().accepted.clone()
    }

    pub fn declined(&self) -> Vec<(CallId, DeclineReason)> {
        self.state.lock().declined.clone()
    }

    /// Messages sent, as `(recipient, text)`
    pub fn messages(&self) -> Vec<(String, String)> {
        self.state.lock().messages.clone()
    }

    pub fn terminate_all_count(&self) -> usize {
        self.state.lock().terminate_all_count
    }

    pub fn process_count(&self) -> usize {
        self.state.lock().process_count
    }

    /// Remote party of the active call
    pub fn active_remote(&self) -> Option<String> {
        self.state.lock().active.as_ref().map(|c| c.remote.clone())
    }
}

#[async_trait]
impl SignalingEngine for SimulatedEngine {
    async fn process_events(&mut self) -> DoorbellResult<Vec<CallNotification>> {
        let mut state = self.state.lock();
        state.process_count += 1;
        Ok(state.pending.drain(..).collect())
    }

    async fn invite(&mut self, address: &str) -> DoorbellResult<CallId> {
        let mut state = self.state.lock();
        if state.fail_invites {
            return Err(DoorbellError::engine("invite", "simulated failure"));
        }
        if state.active.is_some() {
            return Err(DoorbellError::engine("invite", "maximum number of calls reached"));
        }

        let call = SimCall {
            call_id: CallId::new(),
            remote: address.to_string(),
            direction: CallDirection::Outbound,
        };
        state.invites.push(address.to_string());
        state.push(&call, EngineCallState::OutgoingProgress);
        state.push(&call, EngineCallState::OutgoingRinging);
        let call_id = call.call_id;
        state.active = Some(call);
        Ok(call_id)
    }

    async fn accept_call(&mut self, call: CallId) -> DoorbellResult<()> {
        let mut state = self.state.lock();
        let Some(active) = state.active.clone().filter(|c| c.call_id == call) else {
            return Err(DoorbellError::engine("accept_call", format!("unknown call {}", call)));
        };
        if state.fail_accept {
            return Err(DoorbellError::engine("accept_call", "simulated failure"));
        }
        state.accepted.push(call);
        state.push(&active, EngineCallState::Connected);
        state.push(&active, EngineCallState::StreamsRunning);
        Ok(())
    }

    async fn decline_call(&mut self, call: CallId, reason: DeclineReason) -> DoorbellResult<()> {
        let mut state = self.state.lock();
        if !state.active.as_ref().is_some_and(|c| c.call_id == call) {
            return Err(DoorbellError::engine("decline_call", format!("unknown call {}", call)));
        }
        if state.fail_decline {
            return Err(DoorbellError::engine("decline_call", "simulated failure"));
        }
        state.declined.push((call, reason));
        state.end_active(EngineCallState::End, Some("Call declined".to_string()));
        Ok(())
    }

    async fn terminate_all_calls(&mut self) -> DoorbellResult<()> {
        let mut state = self.state.lock();
        state.terminate_all_count += 1;
        if state.fail_terminate {
            return Err(DoorbellError::engine("terminate_all_calls", "simulated failure"));
        }
        state.end_active(EngineCallState::End, Some("Call terminated".to_string()));
        Ok(())
    }

    fn is_in_call(&self) -> bool {
        self.state.lock().active.is_some()
    }

    async fn send_message(&mut self, address: &str, text: &str) -> DoorbellResult<()> {
        let mut state = self.state.lock();
        if state.fail_messages {
            return Err(DoorbellError::notification(address, "simulated delivery failure"));
        }
        state.messages.push((address.to_string(), text.to_string()));
        Ok(())
    }
}

/// Button line whose level is set by hand
#[derive(Debug, Clone)]
pub struct ScriptedPin {
    pin: u32,
    level: Arc<Mutex<Result<Level, String>>>,
}

impl ScriptedPin {
    pub fn new(pin: u32) -> Self {
        Self {
            pin,
            level: Arc::new(Mutex::new(Ok(Level::Released))),
        }
    }

    pub fn set(&self, level: Level) {
        *self.level.lock() = Ok(level);
    }

    pub fn press(&self) {
        self.set(Level::Asserted);
    }

    pub fn release(&self) {
        self.set(Level::Released);
    }

    /// Make subsequent reads fail
    pub fn break_line(&self, message: impl Into<String>) {
        *self.level.lock() = Err(message.into());
    }
}

impl InputPin for ScriptedPin {
    fn read_level(&self) -> DoorbellResult<Level> {
        match &*self.level.lock() {
            Ok(level) => Ok(*level),
            Err(message) => Err(DoorbellError::input(self.pin, message.clone())),
        }
    }

    fn pin(&self) -> u32 {
        self.pin
    }
}

#[derive(Debug, Default)]
struct PlayerState {
    plays: Vec<PathBuf>,
    fail_next: bool,
}

/// Cue player that records what it was asked to play
#[derive(Debug, Clone, Default)]
pub struct RecordingCuePlayer {
    duration: Duration,
    state: Arc<Mutex<PlayerState>>,
}

impl RecordingCuePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block each playback for `duration`, like a real clip would
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn fail_next(&self, fail: bool) {
        self.state.lock().fail_next = fail;
    }

    /// Clips played so far
    pub fn plays(&self) -> Vec<PathBuf> {
        self.state.lock().plays.clone()
    }
}

impl CuePlayer for RecordingCuePlayer {
    fn play_blocking(&self, clip: &Path) -> DoorbellResult<()> {
        {
            let mut state = self.state.lock();
            state.plays.push(clip.to_path_buf());
            if state.fail_next {
                state.fail_next = false;
                return Err(DoorbellError::cue(format!("cannot open {}", clip.display())));
            }
        }
        if !self.duration.is_zero() {
            std::thread::sleep(self.duration);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engine_enforces_single_call() {
        let mut engine = SimulatedEngine::new();
        let first = engine.incoming_call("friend@x");
        let second = engine.incoming_call("stranger@x");
        assert!(engine.is_in_call());
        assert_eq!(engine.declined(), vec![(second, DeclineReason::Busy)]);

        let events = engine.process_events().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].call_id, first);
        assert_eq!(events[0].state, EngineCallState::IncomingReceived);
        assert_eq!(events[1].call_id, second);
        assert_eq!(events[1].state, EngineCallState::End);

        assert!(engine.invite("owner@x").await.is_err());
    }

    #[tokio::test]
    async fn test_terminate_all_ends_active_call() {
        let mut engine = SimulatedEngine::new();
        let call = engine.invite("owner@x").await.unwrap();
        engine.process_events().await.unwrap();

        engine.terminate_all_calls().await.unwrap();
        assert!(!engine.is_in_call());
        assert_eq!(engine.terminate_all_count(), 1);

        let states: Vec<_> = engine
            .process_events()
            .await
            .unwrap()
            .into_iter()
            .map(|n| (n.call_id, n.state))
            .collect();
        assert_eq!(states, vec![(call, EngineCallState::End), (call, EngineCallState::Released)]);
    }

    #[tokio::test]
    async fn test_failure_switches_leave_call_up() {
        let mut engine = SimulatedEngine::new();
        let call = engine.incoming_call("friend@x");

        engine.set_fail_accept(true);
        assert!(engine.accept_call(call).await.is_err());
        assert!(engine.accepted().is_empty());

        engine.set_fail_decline(true);
        assert!(engine.decline_call(call, DeclineReason::Declined).await.is_err());
        assert!(engine.declined().is_empty());

        engine.set_fail_terminate(true);
        assert!(engine.terminate_all_calls().await.is_err());
        assert_eq!(engine.terminate_all_count(), 1);
        assert_eq!(engine.active_remote().as_deref(), Some("friend@x"));

        engine.set_fail_accept(false);
        engine.accept_call(call).await.unwrap();
        assert_eq!(engine.accepted(), vec![call]);
    }

    #[test]
    fn test_engine_carries_account_settings() {
        assert_eq!(SimulatedEngine::new().identity(), None);

        let settings = EngineSettings {
            identity: Some("sip:doorbell@sip.example.org".to_string()),
            server: Some("sip.example.org".to_string()),
            ..EngineSettings::default()
        };
        let engine = SimulatedEngine::with_settings(settings.clone());
        assert_eq!(engine.identity(), Some("sip:doorbell@sip.example.org"));
        assert_eq!(engine.settings(), &settings);
    }

    #[test]
    fn test_scripted_pin() {
        let pin = ScriptedPin::new(17);
        assert_eq!(pin.read_level().unwrap(), Level::Released);
        pin.press();
        assert_eq!(pin.read_level().unwrap(), Level::Asserted);
        pin.break_line("unplugged");
        assert!(pin.read_level().is_err());
        pin.release();
        assert_eq!(pin.read_level().unwrap(), Level::Released);
    }
}
