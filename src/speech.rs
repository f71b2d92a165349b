//! Speech synthesis: the provider capability, audio tracks, retries and narration timing.

pub mod audio;
pub mod elevenlabs;
pub mod narration;
pub mod retry;
pub mod timing;
pub mod tone;

use crate::foundation::error::{ReelError, ReelResult};

pub use audio::AudioTrack;

/// Voice selection passed to a [`SpeechSynthesizer`] on every request.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Voice {
    pub voice_id: String,
    pub model_id: Option<String>,
    /// Provider output format, `pcm_<rate>` or `mp3_<rate>_<kbps>`.
    pub output_format: String,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            voice_id: "bPz3YmDohVKx47H3m07y".to_string(),
            model_id: None,
            output_format: "pcm_44100".to_string(),
        }
    }
}

impl Voice {
    pub fn validate(&self) -> ReelResult<()> {
        if self.voice_id.trim().is_empty() {
            return Err(ReelError::validation("voice_id must be non-empty"));
        }
        OutputFormat::parse(&self.output_format)?;
        Ok(())
    }
}

/// Parsed provider output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw signed 16-bit little-endian mono PCM.
    Pcm { sample_rate: u32 },
    /// MP3, decoded through `ffmpeg`.
    Mp3 { sample_rate: u32 },
}

impl OutputFormat {
    pub fn parse(s: &str) -> ReelResult<Self> {
        let mut parts = s.split('_');
        let codec = parts.next().unwrap_or_default();
        let rate = parts
            .next()
            .and_then(|r| r.parse::<u32>().ok())
            .filter(|r| *r > 0)
            .ok_or_else(|| {
                ReelError::validation(format!("output format '{s}' has no valid sample rate"))
            })?;
        match codec {
            "pcm" => Ok(Self::Pcm { sample_rate: rate }),
            "mp3" => Ok(Self::Mp3 { sample_rate: rate }),
            _ => Err(ReelError::validation(format!(
                "unsupported output format '{s}' (expected pcm_<rate> or mp3_<rate>_<kbps>)"
            ))),
        }
    }

    pub fn sample_rate(self) -> u32 {
        match self {
            Self::Pcm { sample_rate } | Self::Mp3 { sample_rate } => sample_rate,
        }
    }
}

/// Per-character timing reported by a provider, parallel arrays in submission order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CharAlignment {
    pub characters: Vec<String>,
    pub start_secs: Vec<f64>,
    pub end_secs: Vec<f64>,
}

impl CharAlignment {
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Arrays have equal length and times are finite and non-negative.
    pub fn is_consistent(&self) -> bool {
        self.characters.len() == self.start_secs.len()
            && self.characters.len() == self.end_secs.len()
            && self
                .start_secs
                .iter()
                .chain(&self.end_secs)
                .all(|t| t.is_finite() && *t >= 0.0)
    }

    /// Whether this alignment describes `text` character by character.
    pub fn matches_text(&self, text: &str) -> bool {
        self.is_consistent() && self.characters.len() == text.chars().count()
    }
}

/// One synthesis result.
#[derive(Clone, Debug)]
pub struct Speech {
    pub audio: AudioTrack,
    pub alignment: Option<CharAlignment>,
}

/// Capability interface over a text-to-speech provider.
///
/// Implementations must be safe to call from several threads at once; per-segment synthesis
/// issues concurrent requests.
pub trait SpeechSynthesizer: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Synthesize `text` with `voice`. Failures must be [`ReelError::Synthesis`] so the caller can
    /// tell transient from fatal causes.
    fn synthesize(&self, text: &str, voice: &Voice) -> ReelResult<Speech>;
}
