use std::time::Duration;

use crate::{
    foundation::error::{ReelError, ReelResult},
    scene::{CaptionMode, Clip, ClipSource, Layer, SceneConfig, Timeline},
    speech::timing::{WordTiming, allocate_proportional},
    text::{TextSegment, TimingSource},
    viseme::VisemeFrame,
};

/// A validated timeline together with the segment timing its captions were placed against.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ComposedScene {
    pub timeline: Timeline,
    pub segments: Vec<TextSegment>,
}

/// Merge viseme frames, segments and (optionally) word timing into one clip timeline.
///
/// If any segment still carries estimated timing, `total` is distributed across all segments by
/// character count first. Word captions are used only in [`CaptionMode::Words`] and when word
/// timing is available; otherwise there is one caption per segment.
#[tracing::instrument(skip_all, fields(frames = frames.len(), segments = segments.len()))]
pub fn compose(
    frames: &[VisemeFrame],
    segments: &[TextSegment],
    words: &[WordTiming],
    total: Duration,
    scene: &SceneConfig,
) -> ReelResult<ComposedScene> {
    if total.is_zero() {
        return Err(ReelError::timeline("cannot compose a zero-length narration"));
    }
    if segments.is_empty() {
        return Err(ReelError::timeline("cannot compose without text segments"));
    }

    let segments = if segments.iter().any(|s| s.timing == TimingSource::Estimated) {
        tracing::debug!("segments lack provider timing; allocating proportionally");
        allocate_proportional(segments, total)
    } else {
        segments.to_vec()
    };

    let mut clips = Vec::with_capacity(1 + frames.len() + segments.len().max(words.len()));
    clips.push(Clip {
        layer: Layer::Background,
        source: ClipSource::Background(scene.background.clone()),
        start: Duration::ZERO,
        duration: total,
    });

    clips.extend(frames.iter().map(|f| Clip {
        layer: Layer::Character,
        source: ClipSource::Character {
            shape: f.shape,
            sprite: scene.character.sprite_for(f.shape).map(|p| p.to_path_buf()),
        },
        start: f.start,
        duration: f.duration,
    }));

    let use_words = scene.captions == CaptionMode::Words && !words.is_empty();
    if scene.captions == CaptionMode::Words && !use_words {
        tracing::warn!("word captions requested but no word timing; using segment captions");
    }
    if use_words {
        clips.extend(word_captions(words, &segments));
    } else {
        clips.extend(segments.iter().map(|s| Clip {
            layer: Layer::Caption,
            source: ClipSource::Caption {
                text: s.text.clone(),
                segment: s.index,
            },
            start: s.start,
            duration: s.duration,
        }));
    }

    let timeline = Timeline {
        total_duration: total,
        clips,
    };
    timeline.validate(&segments)?;

    tracing::debug!(clips = timeline.clips.len(), "composed timeline");
    Ok(ComposedScene { timeline, segments })
}

/// Word captions clamped to their segment and to the previous word's end; empty words are dropped.
fn word_captions(words: &[WordTiming], segments: &[TextSegment]) -> Vec<Clip> {
    let mut out = Vec::with_capacity(words.len());
    let mut floor = Duration::ZERO;
    for w in words {
        let Some(seg) = segments.get(w.segment) else {
            continue;
        };
        let start = w.start.max(seg.start).max(floor);
        let end = w.end().min(seg.end());
        if end <= start {
            continue;
        }
        out.push(Clip {
            layer: Layer::Caption,
            source: ClipSource::Caption {
                text: w.text.clone(),
                segment: w.segment,
            },
            start,
            duration: end - start,
        });
        floor = end;
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/scene/composer.rs"]
mod tests;
