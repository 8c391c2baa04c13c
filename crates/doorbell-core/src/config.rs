//! Doorbell configuration
//!
//! Configuration is loaded once at startup (normally from a TOML file),
//! validated, and then handed to each component by value. Nothing reads it
//! from global state afterwards.
//!
//! ```toml
//! trusted = ["sip:owner@sip.example.org", "sip:partner@sip.example.org"]
//! button_pin = 17
//! pull = "up"
//! ring_cue = "/home/pi/SmartDoorbell/Ding-dong.wav"
//! max_calls = 1
//! poll_interval_ms = 30
//! debounce_ms = 200
//!
//! [cue_player]
//! backend = "audio"
//!
//! [engine]
//! identity = "sip:doorbell@sip.example.org"
//! server = "sip:sip.example.org;transport=tls"
//! camera = "V4L2: /dev/video0"
//!
//! [logging]
//! level = "info"
//! module_level = "error"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cue::{CueBackend, CuePlayerSettings};
use crate::error::{DoorbellError, DoorbellResult};
use crate::input::PullPolicy;
use crate::trust::TrustList;

/// Polling cadence of the run loop
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30;
/// Quiet window before the button re-arms
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

fn default_max_calls() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

/// Top-level doorbell configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorbellConfig {
    /// Trusted caller addresses; the first one is the owner
    pub trusted: Vec<String>,
    /// GPIO line of the doorbell button; `None` disables the button path
    #[serde(default)]
    pub button_pin: Option<u32>,
    /// Bias wiring of the button line
    #[serde(default)]
    pub pull: PullPolicy,
    /// Clip played when the button places a call; `None` disables the cue
    #[serde(default)]
    pub ring_cue: Option<PathBuf>,
    /// How the ring cue is played
    #[serde(default)]
    pub cue_player: CuePlayerSettings,
    /// Concurrent call limit handed to the engine; must be 1
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    /// Sleep between loop iterations
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Button quiet window
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Settings passed through to the signaling engine
    #[serde(default)]
    pub engine: EngineSettings,
    /// Log levels and format
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Engine account and device settings; opaque to the core
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// SIP identity of the device, e.g. `sip:doorbell@sip.example.org`
    #[serde(default)]
    pub identity: Option<String>,
    /// Registrar / proxy address
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Video capture device name
    #[serde(default)]
    pub camera: Option<String>,
    /// Sound input device name
    #[serde(default)]
    pub sound_capture: Option<String>,
    /// Sound output device name
    #[serde(default)]
    pub sound_playback: Option<String>,
}

impl fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSettings")
            .field("identity", &self.identity)
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("camera", &self.camera)
            .field("sound_capture", &self.sound_capture)
            .field("sound_playback", &self.sound_playback)
            .finish()
    }
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level for the doorbell's own modules
    pub level: String,
    /// Level for everything else (engine, runtime, ...)
    pub module_level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            module_level: "error".to_string(),
            json: false,
            file_info: false,
        }
    }
}

impl DoorbellConfig {
    /// Start a builder with defaults and an empty trust list
    pub fn builder() -> DoorbellConfigBuilder {
        DoorbellConfigBuilder::new()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> DoorbellResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| DoorbellError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> DoorbellResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DoorbellError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check everything the run loop relies on
    pub fn validate(&self) -> DoorbellResult<()> {
        if self.trusted.is_empty() {
            return Err(DoorbellError::config(
                "trust list is empty; the first entry must be the owner address",
            ));
        }

        if let Some(pos) = self.trusted.iter().position(|entry| entry.trim().is_empty()) {
            return Err(DoorbellError::config(format!(
                "trust list entry {} is blank",
                pos
            )));
        }

        if self.max_calls != 1 {
            return Err(DoorbellError::config(format!(
                "max_calls must be 1, got {}",
                self.max_calls
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(DoorbellError::config("poll_interval_ms must be greater than zero"));
        }

        if self.cue_player.backend == CueBackend::Command
            && self.cue_player.command.program.trim().is_empty()
        {
            return Err(DoorbellError::config("cue_player.command.program is blank"));
        }

        Ok(())
    }

    pub fn trust_list(&self) -> DoorbellResult<TrustList> {
        TrustList::new(self.trusted.clone())
    }

    pub fn owner(&self) -> Option<&str> {
        self.trusted.first().map(String::as_str)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn quiet_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Builder for [`DoorbellConfig`]
#[derive(Debug, Clone)]
pub struct DoorbellConfigBuilder {
    config: DoorbellConfig,
}

impl DoorbellConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DoorbellConfig {
                trusted: Vec::new(),
                button_pin: None,
                pull: PullPolicy::default(),
                ring_cue: None,
                cue_player: CuePlayerSettings::default(),
                max_calls: default_max_calls(),
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
                debounce_ms: DEFAULT_DEBOUNCE_MS,
                engine: EngineSettings::default(),
                logging: LoggingSettings::default(),
            },
        }
    }

    /// Append a trusted address; the first one added is the owner
    pub fn trust(mut self, address: impl Into<String>) -> Self {
        self.config.trusted.push(address.into());
        self
    }

    pub fn button_pin(mut self, pin: u32) -> Self {
        self.config.button_pin = Some(pin);
        self
    }

    pub fn pull(mut self, pull: PullPolicy) -> Self {
        self.config.pull = pull;
        self
    }

    pub fn ring_cue(mut self, clip: impl Into<PathBuf>) -> Self {
        self.config.ring_cue = Some(clip.into());
        self
    }

    pub fn cue_player(mut self, settings: CuePlayerSettings) -> Self {
        self.config.cue_player = settings;
        self
    }

    pub fn max_calls(mut self, max_calls: u32) -> Self {
        self.config.max_calls = max_calls;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn debounce(mut self, quiet: Duration) -> Self {
        self.config.debounce_ms = quiet.as_millis() as u64;
        self
    }

    pub fn engine(mut self, engine: EngineSettings) -> Self {
        self.config.engine = engine;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> DoorbellResult<DoorbellConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for DoorbellConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        trusted = ["sip:owner@x", "sip:friend@x"]
        button_pin = 17
        ring_cue = "/home/pi/SmartDoorbell/Ding-dong.wav"

        [engine]
        identity = "sip:doorbell@x"
        password = "hunter2"
        camera = "V4L2: /dev/video0"

        [logging]
        level = "debug"
        module_level = "warn"
    "#;

    #[test]
    fn test_parse_with_defaults() {
        let config = DoorbellConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.owner(), Some("sip:owner@x"));
        assert_eq!(config.button_pin, Some(17));
        assert_eq!(config.pull, PullPolicy::Up);
        assert_eq!(config.max_calls, 1);
        assert_eq!(config.poll_interval(), Duration::from_millis(30));
        assert_eq!(config.quiet_interval(), Duration::from_millis(200));
        assert_eq!(config.cue_player.backend, CueBackend::Audio);
        assert_eq!(config.cue_player.command.program, "aplay");
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json);
        assert_eq!(config.trust_list().unwrap().len(), 2);
    }

    #[test]
    fn test_password_is_not_debug_printed() {
        let config = DoorbellConfig::from_toml_str(SAMPLE).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_empty_trust_list_rejected() {
        let err = DoorbellConfig::from_toml_str("trusted = []").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("trust list is empty"));
    }

    #[test]
    fn test_missing_trust_list_rejected() {
        let err = DoorbellConfig::from_toml_str("button_pin = 17").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(DoorbellConfig::from_toml_str("trusted = [\"a@x\", \"  \"]").is_err());
        assert!(DoorbellConfig::from_toml_str("trusted = [\"a@x\"]\nmax_calls = 2").is_err());
        assert!(DoorbellConfig::from_toml_str("trusted = [\"a@x\"]\npoll_interval_ms = 0").is_err());
        assert!(DoorbellConfig::from_toml_str("trusted = [\"a@x\"]\npull = \"sideways\"").is_err());
        assert!(DoorbellConfig::from_toml_str("trusted = [\"a@x\"]\nbutton_pin = -1").is_err());

        let blank_player = "trusted = [\"a@x\"]\n[cue_player]\nbackend = \"command\"\n[cue_player.command]\nprogram = \" \"";
        assert!(DoorbellConfig::from_toml_str(blank_player).is_err());
    }

    #[test]
    fn test_command_cue_backend() {
        let config = DoorbellConfig::from_toml_str(
            r#"
            trusted = ["a@x"]

            [cue_player]
            backend = "command"

            [cue_player.command]
            program = "paplay"
            "#,
        )
        .unwrap();
        assert_eq!(config.cue_player.backend, CueBackend::Command);
        assert_eq!(config.cue_player.command.program, "paplay");
        assert!(config.cue_player.command.args.is_empty());
        assert!(config.cue_player.device.is_none());
    }

    #[test]
    fn test_builder() {
        let config = DoorbellConfig::builder()
            .trust("owner@x")
            .trust("friend@x")
            .button_pin(17)
            .pull(PullPolicy::Down)
            .debounce(Duration::from_millis(50))
            .build()
            .unwrap();
        assert_eq!(config.trusted, vec!["owner@x", "friend@x"]);
        assert_eq!(config.quiet_interval(), Duration::from_millis(50));
        assert!(config.ring_cue.is_none());

        assert!(DoorbellConfig::builder().build().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = DoorbellConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.camera.as_deref(), Some("V4L2: /dev/video0"));

        let err = DoorbellConfig::load("/nonexistent/doorbell.toml").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_shipped_example_is_valid() {
        let config =
            DoorbellConfig::from_toml_str(include_str!("../../../doorbell.toml.example")).unwrap();
        assert_eq!(config.owner(), Some("sip:owner@sip.example.org"));
        assert_eq!(config.button_pin, Some(17));
        assert_eq!(config.cue_player.backend, CueBackend::Audio);
        assert_eq!(config.cue_player.command, crate::cue::PlayerCommand::default());
    }
}
