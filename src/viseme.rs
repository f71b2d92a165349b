//! Amplitude-driven mouth-shape timeline.
//!
//! The narration is cut into fixed windows, each window's RMS energy is measured, and energies are
//! quantized into a small set of mouth shapes. There is no phoneme analysis.

use std::time::Duration;

use crate::{
    foundation::{
        core::{duration_from_nanos, duration_to_sample, secs_to_duration},
        error::{ReelError, ReelResult},
    },
    speech::AudioTrack,
};

/// Mouth-shape class for one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouthShape {
    Closed,
    Open,
    Wide,
}

impl MouthShape {
    pub const ALL: [MouthShape; 3] = [MouthShape::Closed, MouthShape::Open, MouthShape::Wide];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Wide => "wide",
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VisemeFrame {
    pub index: usize,
    pub shape: MouthShape,
    pub start: Duration,
    pub duration: Duration,
    /// RMS of the window's samples.
    pub energy: f32,
}

impl VisemeFrame {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Smallest accepted analysis window.
pub const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Tunables for [`map_visemes`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VisemeConfig {
    /// Analysis window length in seconds.
    pub window_secs: f64,
    /// Absolute RMS below which the mouth is always closed.
    pub silence_floor: f32,
    /// Relative level (0..=1) at which the mouth opens.
    pub open_threshold: f32,
    /// Relative level (0..=1) at which the mouth opens wide.
    pub wide_threshold: f32,
    /// Measure levels relative to the loudest window instead of absolute RMS.
    pub normalize: bool,
}

impl Default for VisemeConfig {
    fn default() -> Self {
        Self {
            window_secs: 1.0 / 12.0,
            silence_floor: 0.01,
            open_threshold: 0.2,
            wide_threshold: 0.6,
            normalize: true,
        }
    }
}

impl VisemeConfig {
    pub fn validate(&self) -> ReelResult<()> {
        match secs_to_duration(self.window_secs) {
            Some(w) if w >= MIN_WINDOW => {}
            _ => {
                return Err(ReelError::validation(format!(
                    "viseme window_secs must be >= {}, got {}",
                    MIN_WINDOW.as_secs_f64(),
                    self.window_secs
                )));
            }
        }
        if !self.silence_floor.is_finite() || self.silence_floor < 0.0 {
            return Err(ReelError::validation("viseme silence_floor must be >= 0"));
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&self.open_threshold) || !unit.contains(&self.wide_threshold) {
            return Err(ReelError::validation(
                "viseme open/wide thresholds must be in [0, 1]",
            ));
        }
        if self.open_threshold > self.wide_threshold {
            return Err(ReelError::validation(
                "viseme open_threshold must not exceed wide_threshold",
            ));
        }
        Ok(())
    }

    fn window(&self) -> ReelResult<Duration> {
        self.validate()?;
        secs_to_duration(self.window_secs)
            .ok_or_else(|| ReelError::validation("viseme window_secs is not representable"))
    }

    fn classify(&self, energy: f32, peak: f32) -> MouthShape {
        if energy < self.silence_floor {
            return MouthShape::Closed;
        }
        let level = if self.normalize && peak > 0.0 {
            energy / peak
        } else {
            energy
        };
        if level >= self.wide_threshold {
            MouthShape::Wide
        } else if level >= self.open_threshold {
            MouthShape::Open
        } else {
            MouthShape::Closed
        }
    }
}

/// Map `audio` to contiguous viseme frames spanning exactly `[0, audio.total_duration()]`.
///
/// The last window is clamped to the remaining time, so frame durations sum to the track length.
#[tracing::instrument(skip_all, fields(secs = audio.total_duration().as_secs_f64()))]
pub fn map_visemes(audio: &AudioTrack, cfg: &VisemeConfig) -> ReelResult<Vec<VisemeFrame>> {
    let window = cfg.window()?;
    let total = audio.total_duration();
    let count = total.as_nanos().div_ceil(window.as_nanos());
    let samples = audio.samples();
    let sr = audio.sample_rate();

    let mut spans = Vec::with_capacity(count as usize);
    for k in 0..count {
        let start = duration_from_nanos(k * window.as_nanos());
        let end = duration_from_nanos((k + 1) * window.as_nanos()).min(total);
        let s0 = (duration_to_sample(start, sr) as usize).min(samples.len());
        let s1 = (duration_to_sample(end, sr) as usize).clamp(s0, samples.len());
        spans.push((start, end, rms(&samples[s0..s1])));
    }

    let peak = spans.iter().map(|(_, _, e)| *e).fold(0.0f32, f32::max);
    let frames: Vec<VisemeFrame> = spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end, energy))| VisemeFrame {
            index,
            shape: cfg.classify(energy, peak),
            start,
            duration: end - start,
            energy,
        })
        .collect();

    tracing::debug!(frames = frames.len(), peak, "mapped visemes");
    Ok(frames)
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
#[path = "../tests/unit/viseme/mapper.rs"]
mod tests;
