use std::{path::PathBuf, time::Duration};

use crate::{
    foundation::error::{ReelError, ReelResult},
    scene::BackgroundSource,
    text::TextSegment,
    viseme::MouthShape,
};

/// Compositing layer, bottom to top.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Background,
    Character,
    Caption,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipSource {
    Background(BackgroundSource),
    Character {
        shape: MouthShape,
        /// `None` selects the procedural art.
        sprite: Option<PathBuf>,
    },
    Caption {
        text: String,
        /// Index of the segment the caption belongs to.
        segment: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Clip {
    pub layer: Layer,
    pub source: ClipSource,
    pub start: Duration,
    pub duration: Duration,
}

impl Clip {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Ordered clips (by layer, then start) anchored to one total duration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Timeline {
    pub total_duration: Duration,
    pub clips: Vec<Clip>,
}

impl Timeline {
    pub fn layer(&self, layer: Layer) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(move |c| c.layer == layer)
    }

    /// The clip on `layer` that is showing at `t`, if any.
    pub fn clip_at(&self, layer: Layer, t: Duration) -> Option<&Clip> {
        self.layer(layer).find(|c| c.start <= t && t < c.end())
    }

    /// Check the layout rules every rendered timeline must satisfy:
    /// - nothing extends past `total_duration`;
    /// - clips on one layer never overlap;
    /// - one background clip covers everything;
    /// - character clips cover `[0, total_duration]` without gaps;
    /// - each caption stays inside its segment.
    pub fn validate(&self, segments: &[TextSegment]) -> ReelResult<()> {
        let total = self.total_duration;
        if total.is_zero() {
            return Err(ReelError::timeline("timeline total_duration must be > 0"));
        }
        if let Some(c) = self.clips.iter().find(|c| c.end() > total) {
            return Err(ReelError::timeline(format!(
                "{:?} clip ends at {:?}, past total duration {total:?}",
                c.layer,
                c.end()
            )));
        }
        if self.clips.windows(2).any(|w| w[0].layer > w[1].layer) {
            return Err(ReelError::timeline("clips are not grouped by layer"));
        }

        for layer in [Layer::Background, Layer::Character, Layer::Caption] {
            let clips: Vec<&Clip> = self.layer(layer).collect();
            for w in clips.windows(2) {
                if w[1].start < w[0].end() {
                    return Err(ReelError::timeline(format!(
                        "{layer:?} clips overlap or are out of order at {:?}",
                        w[1].start
                    )));
                }
            }
        }

        let backgrounds: Vec<&Clip> = self.layer(Layer::Background).collect();
        match backgrounds.as_slice() {
            [bg] if bg.start.is_zero() && bg.end() == total => {}
            _ => {
                return Err(ReelError::timeline(
                    "expected exactly one background clip spanning the whole timeline",
                ));
            }
        }

        let mut cursor = Duration::ZERO;
        for c in self.layer(Layer::Character) {
            if c.start != cursor {
                return Err(ReelError::timeline(format!(
                    "character layer has a gap or overlap at {cursor:?}"
                )));
            }
            cursor = c.end();
        }
        if cursor != total {
            return Err(ReelError::timeline(format!(
                "character layer ends at {cursor:?}, expected {total:?}"
            )));
        }

        for c in self.layer(Layer::Caption) {
            let ClipSource::Caption { segment, .. } = &c.source else {
                return Err(ReelError::timeline("caption layer holds a non-caption clip"));
            };
            let seg = segments.get(*segment).ok_or_else(|| {
                ReelError::timeline(format!("caption refers to unknown segment {segment}"))
            })?;
            if c.start < seg.start || c.end() > seg.end() {
                return Err(ReelError::timeline(format!(
                    "caption [{:?}, {:?}) exceeds segment {segment} [{:?}, {:?})",
                    c.start,
                    c.end(),
                    seg.start,
                    seg.end()
                )));
            }
        }
        Ok(())
    }
}
