//! Ring cue playback
//!
//! Clips are WAV files decoded with `hound` into [`PcmClip`]s. The default
//! player ([`CpalCuePlayer`], behind the `audio-cpal` feature) writes them to
//! a `cpal` output stream; [`CommandCuePlayer`] hands the file to an external
//! program instead. Both block until the clip is done, so [`RingCue`] runs
//! them on tokio's blocking pool and lets the orchestrator poll for
//! completion each iteration. The signaling engine keeps being pumped while
//! the bell sounds.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DoorbellError, DoorbellResult};

/// Something that can play an audio clip to completion
pub trait CuePlayer: Send + Sync {
    /// Play `clip` and return once playback has finished
    fn play_blocking(&self, clip: &Path) -> DoorbellResult<()>;
}

/// Which player renders the ring cue
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueBackend {
    /// In-process playback on the audio output device
    #[default]
    Audio,
    /// External player program
    Command,
}

/// External player program invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for PlayerCommand {
    fn default() -> Self {
        Self {
            program: "aplay".to_string(),
            args: vec!["-q".to_string()],
        }
    }
}

/// `[cue_player]` configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuePlayerSettings {
    #[serde(default)]
    pub backend: CueBackend,
    /// Output device name for the audio backend; the default device when absent
    #[serde(default)]
    pub device: Option<String>,
    /// Program used by the command backend
    #[serde(default)]
    pub command: PlayerCommand,
}

/// Build the player selected by `settings`
pub fn cue_player(settings: &CuePlayerSettings) -> DoorbellResult<Arc<dyn CuePlayer>> {
    match settings.backend {
        CueBackend::Audio => audio_player(settings.device.clone()),
        CueBackend::Command => Ok(Arc::new(CommandCuePlayer::new(settings.command.clone()))),
    }
}

#[cfg(feature = "audio-cpal")]
fn audio_player(device: Option<String>) -> DoorbellResult<Arc<dyn CuePlayer>> {
    Ok(Arc::new(CpalCuePlayer::new(device)))
}

#[cfg(not(feature = "audio-cpal"))]
fn audio_player(_device: Option<String>) -> DoorbellResult<Arc<dyn CuePlayer>> {
    Err(DoorbellError::config(
        "built without the audio-cpal feature; set cue_player.backend = \"command\"",
    ))
}

/// Decoded WAV clip, interleaved samples normalised to `[-1.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct PcmClip {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl PcmClip {
    /// Decode a WAV file
    pub fn load(path: &Path) -> DoorbellResult<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| DoorbellError::cue(format!("cannot open {}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let scale = (1i64 << spec.bits_per_sample.saturating_sub(1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect()
            }
        }
        .map_err(|e| DoorbellError::cue(format!("cannot decode {}: {}", path.display(), e)))?;

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            channels => self.samples.len() / channels as usize,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Interleaved samples for an output with `channels` channels at `sample_rate`
    ///
    /// Rate conversion is nearest-frame; extra output channels repeat the
    /// clip's last channel.
    pub fn render(&self, channels: u16, sample_rate: u32) -> Vec<f32> {
        let src_frames = self.frames();
        if src_frames == 0 || sample_rate == 0 || self.sample_rate == 0 || channels == 0 {
            return Vec::new();
        }

        let src_channels = self.channels as usize;
        let dst_channels = channels as usize;
        let dst_frames = (src_frames as u64 * sample_rate as u64 / self.sample_rate as u64) as usize;

        let mut out = Vec::with_capacity(dst_frames * dst_channels);
        for i in 0..dst_frames {
            let src = ((i as u64 * self.sample_rate as u64 / sample_rate as u64) as usize).min(src_frames - 1);
            let frame = &self.samples[src * src_channels..(src + 1) * src_channels];
            out.extend((0..dst_channels).map(|c| frame[c.min(src_channels - 1)]));
        }
        out
    }
}

/// Extra time allowed past the clip length before playback counts as stuck
#[cfg(feature = "audio-cpal")]
const PLAYBACK_GRACE: Duration = Duration::from_secs(2);
/// Time left for the device to play out its last buffer
#[cfg(feature = "audio-cpal")]
const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// Plays clips in-process on a `cpal` output stream
#[cfg(feature = "audio-cpal")]
#[derive(Debug, Clone, Default)]
pub struct CpalCuePlayer {
    device: Option<String>,
}

#[cfg(feature = "audio-cpal")]
impl CpalCuePlayer {
    /// Player for the named output device, or the default one
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    fn open_device(&self) -> DoorbellResult<cpal::Device> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let host = cpal::default_host();
        match &self.device {
            None => host
                .default_output_device()
                .ok_or_else(|| DoorbellError::cue("no default audio output device")),
            Some(name) => host
                .output_devices()
                .map_err(|e| DoorbellError::cue(format!("cannot list output devices: {}", e)))?
                .find(|device| device.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| DoorbellError::cue(format!("audio output device {:?} not found", name))),
        }
    }
}

/// Prefer an f32 configuration at the clip's own rate, else the device default
#[cfg(feature = "audio-cpal")]
fn output_config(device: &cpal::Device, sample_rate: u32) -> DoorbellResult<cpal::StreamConfig> {
    use cpal::traits::DeviceTrait;

    let wanted = cpal::SampleRate(sample_rate);
    if let Ok(mut ranges) = device.supported_output_configs() {
        let matching = ranges.find(|range| {
            range.sample_format() == cpal::SampleFormat::F32
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
        });
        if let Some(range) = matching {
            return Ok(range.with_sample_rate(wanted).config());
        }
    }

    device
        .default_output_config()
        .map(|supported| supported.config())
        .map_err(|e| DoorbellError::cue(format!("no usable output configuration: {}", e)))
}

#[cfg(feature = "audio-cpal")]
impl CuePlayer for CpalCuePlayer {
    fn play_blocking(&self, clip: &Path) -> DoorbellResult<()> {
        use cpal::traits::{DeviceTrait, StreamTrait};

        let pcm = PcmClip::load(clip)?;
        let device = self.open_device()?;
        let config = output_config(&device, pcm.sample_rate)?;
        let samples = pcm.render(config.channels, config.sample_rate.0);

        let (done_tx, done_rx) = std::sync::mpsc::channel::<Result<(), String>>();
        let error_tx = done_tx.clone();
        let mut done_tx = Some(done_tx);
        let mut position = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let available = samples.len().saturating_sub(position).min(data.len());
                    data[..available].copy_from_slice(&samples[position..position + available]);
                    data[available..].fill(0.0);
                    position += available;
                    if position >= samples.len() {
                        if let Some(tx) = done_tx.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                },
                move |err| {
                    let _ = error_tx.send(Err(err.to_string()));
                },
                None,
            )
            .map_err(|e| DoorbellError::cue(format!("cannot open output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| DoorbellError::cue(format!("cannot start output stream: {}", e)))?;
        debug!(clip = %clip.display(), channels = config.channels, sample_rate = config.sample_rate.0, "Ring cue playing");

        let outcome = done_rx.recv_timeout(pcm.duration() + PLAYBACK_GRACE);
        std::thread::sleep(DRAIN_DELAY);
        drop(stream);

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DoorbellError::cue(format!("playback of {} failed: {}", clip.display(), e))),
            Err(_) => Err(DoorbellError::cue(format!("playback of {} timed out", clip.display()))),
        }
    }
}

/// Plays clips by running an external program (`aplay -q <clip>` by default)
#[derive(Debug, Clone, Default)]
pub struct CommandCuePlayer {
    command: PlayerCommand,
}

impl CommandCuePlayer {
    pub fn new(command: PlayerCommand) -> Self {
        Self { command }
    }
}

impl CuePlayer for CommandCuePlayer {
    fn play_blocking(&self, clip: &Path) -> DoorbellResult<()> {
        let status = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(clip)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| {
                DoorbellError::cue(format!("cannot run {}: {}", self.command.program, e))
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(DoorbellError::cue(format!(
                "{} exited with {} playing {}",
                self.command.program,
                status,
                clip.display()
            )))
        }
    }
}

/// Non-blocking handle over a [`CuePlayer`] for one configured clip
pub struct RingCue {
    player: Arc<dyn CuePlayer>,
    clip: PathBuf,
    playback: Option<JoinHandle<DoorbellResult<()>>>,
}

impl RingCue {
    pub fn new(player: Arc<dyn CuePlayer>, clip: impl Into<PathBuf>) -> Self {
        Self {
            player,
            clip: clip.into(),
            playback: None,
        }
    }

    pub fn clip(&self) -> &Path {
        &self.clip
    }

    pub fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start playback unless the clip is already sounding
    ///
    /// Returns `false` when a previous playback is still running.
    pub fn start(&mut self) -> bool {
        if self.is_playing() {
            debug!(clip = %self.clip.display(), "Ring cue already playing");
            return false;
        }

        let player = Arc::clone(&self.player);
        let clip = self.clip.clone();
        self.playback = Some(tokio::task::spawn_blocking(move || player.play_blocking(&clip)));
        true
    }

    /// Collect the result of a finished playback
    ///
    /// Returns `None` while the clip is still playing or if nothing was
    /// started. Never waits.
    pub async fn poll(&mut self) -> Option<DoorbellResult<()>> {
        match &self.playback {
            Some(handle) if handle.is_finished() => {}
            _ => return None,
        }

        let handle = self.playback.take()?;
        Some(match handle.await {
            Ok(result) => result,
            Err(e) => Err(DoorbellError::cue(format!("playback task failed: {}", e))),
        })
    }

    /// Stop tracking any playback; the blocking thread runs out on its own
    pub fn detach(&mut self) {
        if let Some(handle) = self.playback.take() {
            if !handle.is_finished() {
                warn!(clip = %self.clip.display(), "Leaving ring cue playback running at shutdown");
            }
        }
    }
}

impl std::fmt::Debug for RingCue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingCue")
            .field("clip", &self.clip)
            .field("playing", &self.is_playing())
            .finish()
    }
}
