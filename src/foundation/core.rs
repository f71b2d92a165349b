use std::time::Duration;

use crate::foundation::error::{ReelError, ReelResult};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Absolute 0-based video frame index in output timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame (floored to whole nanoseconds).
    pub fn frame_duration(self) -> Duration {
        self.frame_start(FrameIndex(1))
    }

    /// Presentation time of frame `idx` (floored to whole nanoseconds).
    pub fn frame_start(self, idx: FrameIndex) -> Duration {
        let nanos = u128::from(idx.0) * u128::from(self.den) * NANOS_PER_SEC / u128::from(self.num);
        duration_from_nanos(nanos)
    }

    /// Smallest frame count whose span covers `total`.
    pub fn frames_covering(self, total: Duration) -> u64 {
        let num = total.as_nanos() * u128::from(self.num);
        let den = u128::from(self.den) * NANOS_PER_SEC;
        num.div_ceil(den) as u64
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn validate(&self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::validation("canvas width/height must be > 0"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(ReelError::validation(
                "canvas width/height must be even (required for yuv420p output)",
            ));
        }
        Ok(())
    }

    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Duration spanned by `samples` PCM frames at `sample_rate` (floored to whole nanoseconds).
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    duration_from_nanos(u128::from(samples) * NANOS_PER_SEC / u128::from(sample_rate))
}

/// Index of the PCM frame that starts at or before `t`.
pub fn duration_to_sample(t: Duration, sample_rate: u32) -> u64 {
    (t.as_nanos() * u128::from(sample_rate) / NANOS_PER_SEC) as u64
}

/// Convert provider-reported seconds into a `Duration`.
///
/// Returns `None` for negative or non-finite input.
pub fn secs_to_duration(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

pub(crate) fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = (nanos / NANOS_PER_SEC) as u64;
    let sub = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, sub)
}

/// `total * part / whole` in integer nanoseconds, floored.
pub(crate) fn scale_duration(total: Duration, part: u64, whole: u64) -> Duration {
    if whole == 0 {
        return Duration::ZERO;
    }
    duration_from_nanos(total.as_nanos() * u128::from(part) / u128::from(whole))
}
