//! The doorbell run loop
//!
//! [`Orchestrator`] owns the call session and drives everything else from a
//! single cooperative loop. Each iteration, in order:
//!
//! 1. pumps the signaling engine and applies the notifications it returns
//!    (admission decisions for inbound calls happen here);
//! 2. collects a finished ring cue, if one was playing;
//! 3. samples the button through the [`DoorbellTrigger`];
//! 4. on a ring intent, invites the owner and starts the ring cue.
//!
//! Between iterations it sleeps for the poll interval or until shutdown is
//! requested, whichever comes first. Shutdown is observed only at iteration
//! boundaries. On exit every call is terminated exactly once.
//!
//! Runtime failures never escape an iteration: they are logged, counted in
//! [`DoorbellStats::contained_errors`] and the loop carries on.
//!
//! # Example
//!
//! ```rust,no_run
//! use doorbell_core::{DoorbellConfig, Orchestrator};
//! use doorbell_core::sim::{ScriptedPin, SimulatedEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), doorbell_core::DoorbellError> {
//! let config = DoorbellConfig::builder()
//!     .trust("sip:owner@example.com")
//!     .button_pin(17)
//!     .build()?;
//!
//! let mut doorbell = Orchestrator::new(&config, SimulatedEngine::new())?
//!     .with_button(Box::new(ScriptedPin::new(17)));
//!
//! let shutdown = CancellationToken::new();
//! let stats = doorbell.run(shutdown).await;
//! println!("{} presses", stats.presses);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DoorbellConfig;
use crate::cue::RingCue;
use crate::engine::{CallId, CallNotification, DeclineReason, EngineCallState, SignalingEngine};
use crate::error::{DoorbellError, DoorbellResult};
use crate::events::{DoorbellEvent, DoorbellStats, EventBus, TimedEvent};
use crate::input::InputPin;
use crate::session::{CallOutcome, CallSession, SessionEvent};
use crate::trigger::{DoorbellTrigger, Intent};
use crate::trust::{Admission, OwnerNotice, TrustGate};

/// Single-loop coordinator of engine, button and ring cue
pub struct Orchestrator<E: SignalingEngine> {
    engine: E,
    gate: TrustGate,
    session: CallSession,
    trigger: DoorbellTrigger,
    button: Option<Box<dyn InputPin>>,
    ring_cue: Option<RingCue>,
    poll_interval: Duration,
    events: EventBus,
    stats: DoorbellStats,
}

impl<E: SignalingEngine> Orchestrator<E> {
    /// Build an orchestrator from a configuration
    ///
    /// Fails with a configuration error before anything runs if the
    /// configuration is unusable (empty trust list, ...).
    pub fn new(config: &DoorbellConfig, engine: E) -> DoorbellResult<Self> {
        config.validate()?;
        let gate = TrustGate::new(config.trust_list()?);

        debug!(
            trusted = %gate.trust_list(),
            button_pin = ?config.button_pin,
            pull = ?config.pull,
            ring_cue = ?config.ring_cue,
            poll_interval_ms = config.poll_interval_ms,
            debounce_ms = config.debounce_ms,
            engine = ?config.engine,
            "Doorbell configuration"
        );

        Ok(Self {
            engine,
            gate,
            session: CallSession::new(),
            trigger: DoorbellTrigger::new(config.quiet_interval()),
            button: None,
            ring_cue: None,
            poll_interval: config.poll_interval(),
            events: EventBus::new(),
            stats: DoorbellStats::default(),
        })
    }

    /// Attach the doorbell button; without one the button path is disabled
    pub fn with_button(mut self, button: Box<dyn InputPin>) -> Self {
        self.button = Some(button);
        self
    }

    /// Attach the ring cue; without one no sound is played
    pub fn with_ring_cue(mut self, cue: RingCue) -> Self {
        self.ring_cue = Some(cue);
        self
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn stats(&self) -> &DoorbellStats {
        &self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn owner(&self) -> &str {
        self.gate.owner()
    }

    /// Subscribe to doorbell events
    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.events.subscribe()
    }

    /// Run until `shutdown` is cancelled, then terminate calls and return totals
    pub async fn run(&mut self, shutdown: CancellationToken) -> DoorbellStats {
        info!(
            owner = %self.gate.owner(),
            button = ?self.button.as_ref().map(|b| b.pin()),
            ring_cue = ?self.ring_cue.as_ref().map(|c| c.clip().display().to_string()),
            "Doorbell running"
        );

        while !shutdown.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        self.shutdown().await;
        self.stats.clone()
    }

    /// Run exactly one loop iteration
    pub async fn tick(&mut self) {
        match self.engine.process_events().await {
            Ok(notifications) => {
                for notification in notifications {
                    self.on_call_state_changed(notification).await;
                }
            }
            Err(e) => self.contain("process_events", e),
        }

        self.collect_cue().await;

        if self.sample_button() == Intent::Ring {
            self.ring().await;
        }

        self.stats.iterations += 1;
    }

    async fn on_call_state_changed(&mut self, notification: CallNotification) {
        let Some(event) = SessionEvent::from_notification(&notification) else {
            self.observe(&notification);
            return;
        };

        let tracked = !self.session.handle(event.clone()).is_empty();

        match event {
            SessionEvent::InboundArrived { call_id, caller } => {
                if !tracked {
                    debug!(%call_id, %caller, state = %self.session.state(), "Ignoring inbound call; session busy");
                    return;
                }
                self.admit(call_id, &caller).await;
            }
            SessionEvent::Terminated { call_id, outcome } => {
                if !tracked {
                    debug!(%call_id, %outcome, "Ignoring end of untracked call");
                    return;
                }
                match outcome {
                    CallOutcome::Failed => {
                        self.stats.call_errors += 1;
                        warn!(
                            %call_id,
                            reason = notification.message.as_deref().unwrap_or("unknown"),
                            "Call {}.",
                            outcome
                        );
                    }
                    _ => {
                        self.stats.calls_ended += 1;
                        info!(%call_id, "Call {}.", outcome);
                    }
                }
                self.events.publish(DoorbellEvent::CallEnded { call_id, outcome });
            }
            _ => {}
        }
    }

    fn observe(&self, notification: &CallNotification) {
        match notification.state {
            EngineCallState::Connected => info!(call_id = %notification.call_id, "Call connected."),
            state => debug!(call_id = %notification.call_id, %state, remote = %notification.remote, "Call state changed"),
        }
        self.events.publish(DoorbellEvent::CallStateObserved {
            call_id: notification.call_id,
            state: notification.state,
        });
    }

    async fn admit(&mut self, call_id: CallId, caller: &str) {
        match self.gate.admit(caller) {
            Admission::Accept => {
                info!(%call_id, %caller, "Trusted user {} is calling in. Accepting call.", caller);
                if let Err(e) = self.engine.accept_call(call_id).await {
                    self.contain("accept_call", e);
                    return;
                }
                self.session.handle(SessionEvent::Admitted);
                self.stats.admitted += 1;
                self.events.publish(DoorbellEvent::InboundAdmitted {
                    call_id,
                    caller: caller.to_string(),
                });
            }
            Admission::Decline(notice) => {
                warn!(
                    %call_id,
                    %caller,
                    "Untrusted user {} is calling in. Declining and sending message to {}.",
                    caller,
                    notice.recipient
                );
                if let Err(e) = self.engine.decline_call(call_id, DeclineReason::Declined).await {
                    self.contain("decline_call", e);
                }
                self.session.handle(SessionEvent::Declined);
                self.stats.declined += 1;
                self.events.publish(DoorbellEvent::InboundDeclined {
                    call_id,
                    caller: caller.to_string(),
                });
                self.notify_owner(notice).await;
            }
        }
    }

    /// Best effort: a failed notice never reverses or retries the decline
    async fn notify_owner(&mut self, notice: OwnerNotice) {
        match self.engine.send_message(&notice.recipient, &notice.text).await {
            Ok(()) => {
                debug!(recipient = %notice.recipient, caller = %notice.caller, "Owner notified");
                self.events.publish(DoorbellEvent::OwnerNotified {
                    recipient: notice.recipient,
                    caller: notice.caller,
                });
            }
            Err(e) => {
                warn!(recipient = %notice.recipient, error = %e, "Could not notify owner of untrusted caller");
                self.stats.notification_failures += 1;
                self.events.publish(DoorbellEvent::NotificationFailed {
                    recipient: notice.recipient,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn sample_button(&mut self) -> Intent {
        let Some(button) = self.button.as_ref() else {
            return Intent::None;
        };

        let level = match button.read_level() {
            Ok(level) => level,
            Err(e) => {
                self.contain("read_level", e);
                return Intent::None;
            }
        };

        let call_active = !self.session.is_idle() || self.engine.is_in_call();
        let intent = self.trigger.sample(level, Instant::now(), call_active);

        match intent {
            Intent::Ring => {
                self.events.publish(DoorbellEvent::ButtonPressed {
                    count: self.stats.presses,
                });
                self.stats.presses += 1;
            }
            Intent::Suppressed => {
                self.stats.presses += 1;
                info!(state = %self.session.state(), "Doorbell button pressed during a call; ignoring");
                self.events.publish(DoorbellEvent::PressIgnored);
            }
            Intent::None => {}
        }
        intent
    }

    async fn ring(&mut self) {
        let owner = self.gate.owner().to_string();

        if !self.session.is_idle() || self.engine.is_in_call() {
            warn!(state = %self.session.state(), "Refusing to call {} while a call is active", owner);
            return;
        }

        info!("Doorbell button pressed; calling {}", owner);
        let call_id = match self.engine.invite(&owner).await {
            Ok(call_id) => call_id,
            Err(e) => {
                self.contain("invite", e);
                return;
            }
        };

        if let Err(e) = self.session.begin_outbound(call_id, owner.clone()) {
            self.contain("begin_outbound", e);
            return;
        }
        self.stats.invites += 1;
        self.events.publish(DoorbellEvent::OutboundCallPlaced {
            call_id,
            callee: owner,
        });

        if let Some(cue) = self.ring_cue.as_mut() {
            if cue.start() {
                self.stats.cues_played += 1;
            }
        }
    }

    async fn collect_cue(&mut self) {
        let Some(cue) = self.ring_cue.as_mut() else {
            return;
        };
        let Some(result) = cue.poll().await else {
            return;
        };

        let clip = cue.clip().to_path_buf();
        let ok = match result {
            Ok(()) => {
                debug!(clip = %clip.display(), "Ring cue finished");
                true
            }
            Err(e) => {
                self.contain("play_ring_cue", e);
                false
            }
        };
        self.events.publish(DoorbellEvent::CueFinished { clip, ok });
    }

    async fn shutdown(&mut self) {
        self.events.publish(DoorbellEvent::ShuttingDown);

        if let Some(cue) = self.ring_cue.as_mut() {
            cue.detach();
        }

        if let Err(e) = self.engine.terminate_all_calls().await {
            self.stats.contained_errors += 1;
            warn!(error = %e, "Failed to terminate calls during shutdown");
        }
        self.session.reset();

        info!(
            iterations = self.stats.iterations,
            presses = self.stats.presses,
            invites = self.stats.invites,
            admitted = self.stats.admitted,
            declined = self.stats.declined,
            "Terminating."
        );
    }

    fn contain(&mut self, operation: &str, e: DoorbellError) {
        self.stats.contained_errors += 1;
        error!(operation, error = %e, "Doorbell operation failed; continuing");
    }
}

impl<E: SignalingEngine> std::fmt::Debug for Orchestrator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("owner", &self.gate.owner())
            .field("session", &self.session)
            .field("button", &self.button.as_ref().map(|b| b.pin()))
            .field("ring_cue", &self.ring_cue)
            .field("poll_interval", &self.poll_interval)
            .field("stats", &self.stats)
            .finish()
    }
}
