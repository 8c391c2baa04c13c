//! # Doorbell Core - Call orchestration for a SIP smart doorbell
//!
//! This crate is the control layer of a two-way smart doorbell: a push button
//! that calls the owner, and an inbound gate that lets trusted callers through
//! to the camera while turning everyone else away.
//!
//! - **trust**: pure admission decisions against an ordered trust list
//! - **session**: the single active call as a small state machine
//! - **trigger**: button edge detection with an explicit debounce window
//! - **orchestrator**: the cooperative run loop tying it all together
//!
//! The SIP/media engine, the GPIO driver and the audio output are
//! collaborators reached through the [`SignalingEngine`], [`InputPin`] and
//! [`CuePlayer`] traits. The [`sim`] module provides in-memory versions of all
//! three.
//!
//! ## Quick Start
//!
//! ```rust
//! use doorbell_core::{DoorbellConfig, Orchestrator, SessionState};
//! use doorbell_core::sim::SimulatedEngine;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), doorbell_core::DoorbellError> {
//! let config = DoorbellConfig::builder()
//!     .trust("sip:owner@example.com")
//!     .trust("sip:friend@example.com")
//!     .build()?;
//!
//! let engine = SimulatedEngine::new();
//! let mut doorbell = Orchestrator::new(&config, engine.clone())?;
//!
//! engine.incoming_call("sip:friend@example.com");
//! doorbell.tick().await;
//! assert_eq!(doorbell.session().state(), SessionState::Connected);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cue;
pub mod engine;
pub mod error;
pub mod events;
pub mod input;
pub mod orchestrator;
pub mod session;
pub mod sim;
pub mod trigger;
pub mod trust;

// Re-export main types
pub use config::{DoorbellConfig, DoorbellConfigBuilder, EngineSettings, LoggingSettings};
pub use cue::{
    cue_player, CommandCuePlayer, CueBackend, CuePlayer, CuePlayerSettings, PcmClip, PlayerCommand,
    RingCue,
};
#[cfg(feature = "audio-cpal")]
pub use cue::CpalCuePlayer;
pub use engine::{CallId, CallNotification, DeclineReason, EngineCallState, SignalingEngine};
pub use error::{DoorbellError, DoorbellResult};
pub use events::{DoorbellEvent, DoorbellStats, TimedEvent};
pub use input::{InputPin, Level, PullPolicy, SysfsPin};
pub use orchestrator::Orchestrator;
pub use session::{CallDirection, CallOutcome, CallSession, CallState as SessionState};
pub use trigger::{DoorbellTrigger, Intent};
pub use trust::{admit, Admission, OwnerNotice, TrustGate, TrustList};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
