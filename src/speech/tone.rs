use std::time::Duration;

use crate::{
    foundation::{
        core::duration_to_sample,
        error::{ReelError, ReelResult, SynthesisCause},
    },
    speech::{AudioTrack, CharAlignment, Speech, SpeechSynthesizer, Voice},
};

/// Offline, deterministic stand-in for a TTS provider.
///
/// Every input character gets one fixed-length slot: vowels are loud, other letters and digits
/// quieter, everything else silent. The result carries exact per-character alignment, so it
/// exercises the same timing paths as a real provider.
#[derive(Clone, Debug)]
pub struct ToneSynthesizer {
    pub sample_rate: u32,
    pub char_duration: Duration,
    pub pitch_hz: f32,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            char_duration: Duration::from_millis(70),
            pitch_hz: 160.0,
        }
    }
}

impl ToneSynthesizer {
    fn amplitude(c: char) -> f32 {
        if "aeiouyAEIOUY".contains(c) {
            0.6
        } else if c.is_alphanumeric() {
            0.25
        } else {
            0.0
        }
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn name(&self) -> &str {
        "tone"
    }

    fn synthesize(&self, text: &str, _voice: &Voice) -> ReelResult<Speech> {
        if text.is_empty() {
            return Err(ReelError::synthesis(
                SynthesisCause::BadRequest(400),
                "text must be non-empty",
            ));
        }
        if self.sample_rate == 0 || self.char_duration.is_zero() {
            return Err(ReelError::synthesis(
                SynthesisCause::BadRequest(400),
                "tone synthesizer needs a sample rate and char duration",
            ));
        }

        let mut samples = Vec::new();
        let mut alignment = CharAlignment {
            characters: Vec::new(),
            start_secs: Vec::new(),
            end_secs: Vec::new(),
        };
        let step = std::f32::consts::TAU * self.pitch_hz / self.sample_rate as f32;
        for (i, c) in text.chars().enumerate() {
            let start = self.char_duration * i as u32;
            let end = start + self.char_duration;
            let s0 = duration_to_sample(start, self.sample_rate);
            let s1 = duration_to_sample(end, self.sample_rate);
            let amp = Self::amplitude(c);
            for n in s0..s1 {
                samples.push(amp * (step * n as f32).sin());
            }
            alignment.characters.push(c.to_string());
            alignment.start_secs.push(start.as_secs_f64());
            alignment.end_secs.push(end.as_secs_f64());
        }

        let audio = AudioTrack::from_pcm(samples, self.sample_rate)
            .map_err(|e| ReelError::synthesis(SynthesisCause::InvalidResponse, e.to_string()))?;
        Ok(Speech {
            audio,
            alignment: Some(alignment),
        })
    }
}
