//! Sensory alert: a synthesized tone plus a transient banner.

use std::f32::consts::TAU;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::{ClientError, Result};

/// A sine tone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tone {
    /// Pitch.
    pub frequency_hz: f32,
    /// Length.
    pub duration: Duration,
    /// Output sample rate.
    pub sample_rate: u32,
    /// Peak amplitude in `0.0..=1.0`.
    pub volume: f32,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency_hz: 880.0,
            duration: Duration::from_millis(250),
            sample_rate: 44_100,
            volume: 0.3,
        }
    }
}

/// Length of the linear fade at each end, to avoid clicks.
const FADE: Duration = Duration::from_millis(10);

/// Render `tone` as mono `f32` samples.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn synthesize(tone: &Tone) -> Vec<f32> {
    let rate = tone.sample_rate as f32;
    let total = (tone.duration.as_secs_f32() * rate).round() as usize;
    let fade = ((FADE.as_secs_f32() * rate) as usize).min(total / 2).max(1);
    let step = TAU * tone.frequency_hz / rate;

    (0..total)
        .map(|i| {
            let edge = i.min(total - 1 - i);
            let envelope = (edge as f32 / fade as f32).min(1.0);
            (step * i as f32).sin() * tone.volume * envelope
        })
        .collect()
}

/// Somewhere to play alert samples.
pub trait AudioOutput: Send + Sync {
    /// Play mono samples at `sample_rate`.
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()>;
}

/// Writes the tone as signed 16-bit little-endian mono PCM, e.g. to stdout
/// piped into `aplay -f S16_LE -r 44100`.
#[derive(Debug)]
pub struct PcmStream<W> {
    sink: Mutex<W>,
}

impl<W: Write + Send> PcmStream<W> {
    /// Stream into `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// The sink, for inspecting what was written.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

/// Scale `[-1.0, 1.0]` to `i16`, clamping out-of-range samples.
#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

impl<W: Write + Send> AudioOutput for PcmStream<W> {
    fn play(&self, samples: &[f32], _sample_rate: u32) -> Result<()> {
        let bytes: Vec<u8> = samples
            .iter()
            .flat_map(|s| to_pcm16(*s).to_le_bytes())
            .collect();
        let mut sink = self.sink.lock();
        sink.write_all(&bytes)
            .and_then(|()| sink.flush())
            .map_err(|e| ClientError::AudioUnavailable(e.to_string()))
    }
}

/// For terminals with no PCM sink: rings the bell once per tone.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl AudioOutput for TerminalBell {
    fn play(&self, samples: &[f32], _sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Err(ClientError::AudioUnavailable("empty tone".into()));
        }
        let mut err = std::io::stderr();
        err.write_all(b"\x07")
            .and_then(|()| err.flush())
            .map_err(|e| ClientError::AudioUnavailable(e.to_string()))
    }
}

/// No audio device.
#[derive(Debug, Default)]
pub struct NoAudio;

impl AudioOutput for NoAudio {
    fn play(&self, _samples: &[f32], _sample_rate: u32) -> Result<()> {
        Err(ClientError::AudioUnavailable("no output configured".into()))
    }
}

/// A visible banner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Banner {
    /// Text shown.
    pub message: String,
    /// Increases with every `show`; the auto-dismiss only clears its own.
    pub generation: u64,
}

/// Holds at most one banner. Showing a new one replaces the old one.
#[derive(Clone)]
pub struct BannerSlot {
    current: Arc<Mutex<Option<Banner>>>,
    generation: Arc<AtomicU64>,
    duration: Duration,
}

impl BannerSlot {
    /// An empty slot whose banners dismiss after `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            duration,
        }
    }

    /// Show `message`, replacing any current banner, and schedule its
    /// dismissal. Must be called within a tokio runtime.
    pub fn show(&self, message: &str) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.current.lock() = Some(Banner {
            message: message.to_owned(),
            generation,
        });

        let current = self.current.clone();
        let duration = self.duration;
        let _ = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut slot = current.lock();
            if slot.as_ref().is_some_and(|b| b.generation == generation) {
                *slot = None;
            }
        });
        generation
    }

    /// The banner on screen, if any.
    pub fn current(&self) -> Option<Banner> {
        self.current.lock().clone()
    }

    /// Remove the banner now.
    pub fn dismiss(&self) {
        *self.current.lock() = None;
    }
}

/// What an alert actually did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertOutcome {
    /// The tone played.
    pub sound: bool,
    /// Generation of the banner shown.
    pub banner: u64,
}

/// Tone + banner.
#[derive(Clone)]
pub struct Alerter {
    audio: Arc<dyn AudioOutput>,
    samples: Arc<[f32]>,
    sample_rate: u32,
    banner: BannerSlot,
}

impl Alerter {
    /// Render `tone` once and keep it for every alert.
    pub fn new(audio: Arc<dyn AudioOutput>, tone: &Tone, banner_duration: Duration) -> Self {
        Self {
            audio,
            samples: synthesize(tone).into(),
            sample_rate: tone.sample_rate,
            banner: BannerSlot::new(banner_duration),
        }
    }

    /// Play the tone and show `message`. An audio failure still shows the
    /// banner.
    pub fn trigger(&self, message: &str) -> AlertOutcome {
        let sound = match self.audio.play(&self.samples, self.sample_rate) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "alert tone unavailable, banner only");
                false
            }
        };
        AlertOutcome {
            sound,
            banner: self.banner.show(message),
        }
    }

    /// The banner slot.
    pub fn banner(&self) -> &BannerSlot {
        &self.banner
    }
}
