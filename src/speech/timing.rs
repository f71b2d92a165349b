//! Turning provider timing metadata into segment and word timing.

use std::time::Duration;

use crate::{
    foundation::core::{scale_duration, secs_to_duration},
    speech::CharAlignment,
    text::{TextSegment, TimingSource},
};

/// A spoken word with provider-confirmed timing, used for word-level captions.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WordTiming {
    pub text: String,
    pub start: Duration,
    pub duration: Duration,
    /// Index of the segment the word belongs to.
    pub segment: usize,
}

impl WordTiming {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Retime `segments` from a whole-text alignment of `text`.
///
/// Segment `i > 0` starts at the provider start time of its first non-whitespace character; the
/// first segment starts at zero and the last ends at `total`. Boundaries are clamped to be
/// monotonic and inside `[0, total]`, so the result tiles `[0, total]` exactly.
///
/// The caller must check `alignment.matches_text(text)` first.
pub fn segments_from_alignment(
    text: &str,
    segments: &[TextSegment],
    alignment: &CharAlignment,
    total: Duration,
) -> Vec<TextSegment> {
    let mut bounds = Vec::with_capacity(segments.len() + 1);
    bounds.push(Duration::ZERO);
    for seg in segments.iter().skip(1) {
        let slice = &text[seg.span.clone()];
        let lead = slice.len() - slice.trim_start().len();
        let char_idx = text[..seg.span.start + lead].chars().count();
        let prev = *bounds.last().unwrap_or(&Duration::ZERO);
        let t = alignment
            .start_secs
            .get(char_idx)
            .and_then(|s| secs_to_duration(*s))
            .unwrap_or(prev);
        bounds.push(t.clamp(prev, total));
    }
    bounds.push(total);

    segments
        .iter()
        .zip(bounds.windows(2))
        .map(|(seg, b)| seg.retimed(b[0], b[1] - b[0], TimingSource::Provider))
        .collect()
}

/// Retime `segments` from per-segment audio lengths (same order). The last segment absorbs any
/// rounding so the durations sum to `total`.
pub fn segments_from_durations(
    segments: &[TextSegment],
    durations: &[Duration],
    total: Duration,
) -> Vec<TextSegment> {
    let mut out = Vec::with_capacity(segments.len());
    let mut cursor = Duration::ZERO;
    for (i, (seg, d)) in segments.iter().zip(durations).enumerate() {
        let start = cursor.min(total);
        let duration = if i + 1 == segments.len() {
            total - start
        } else {
            (*d).min(total - start)
        };
        out.push(seg.retimed(start, duration, TimingSource::Provider));
        cursor = start + duration;
    }
    out
}

/// Distribute `total` across `segments` proportionally to character count.
///
/// Boundaries are computed in integer nanoseconds from cumulative counts, so the segments tile
/// `[0, total]` exactly.
pub fn allocate_proportional(segments: &[TextSegment], total: Duration) -> Vec<TextSegment> {
    let weights: Vec<u64> = segments
        .iter()
        .map(|s| s.char_count().max(1) as u64)
        .collect();
    let whole: u64 = weights.iter().sum();

    let mut out = Vec::with_capacity(segments.len());
    let mut cum = 0u64;
    let mut start = Duration::ZERO;
    for (seg, w) in segments.iter().zip(&weights) {
        cum += w;
        let end = scale_duration(total, cum, whole);
        out.push(seg.retimed(start, end - start, TimingSource::Proportional));
        start = end;
    }
    out
}

/// Split an alignment into words at whitespace characters.
///
/// A word runs from its first character's start time to the start of the whitespace that ends it
/// (or, for the final word, the last character's end time). Words with no duration are dropped.
/// `segment_of` maps an alignment character index to its segment; `offset` shifts every time.
pub fn words_from_alignment(
    alignment: &CharAlignment,
    offset: Duration,
    segment_of: impl Fn(usize) -> usize,
) -> Vec<WordTiming> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut first: Option<usize> = None;

    let mut flush = |current: &mut String, first: &mut Option<usize>, end: Option<Duration>| {
        if let (Some(idx), Some(end)) = (first.take(), end) {
            let start = alignment
                .start_secs
                .get(idx)
                .and_then(|s| secs_to_duration(*s));
            if let Some(start) = start
                && end > start
                && !current.trim().is_empty()
            {
                words.push(WordTiming {
                    text: current.clone(),
                    start: offset + start,
                    duration: end - start,
                    segment: segment_of(idx),
                });
            }
        }
        current.clear();
    };

    for (i, ch) in alignment.characters.iter().enumerate() {
        if ch.chars().all(char::is_whitespace) {
            let end = alignment
                .start_secs
                .get(i)
                .and_then(|s| secs_to_duration(*s));
            flush(&mut current, &mut first, end);
        } else {
            if first.is_none() {
                first = Some(i);
            }
            current.push_str(ch);
        }
    }
    let end = alignment
        .characters
        .len()
        .checked_sub(1)
        .and_then(|last| alignment.end_secs.get(last))
        .and_then(|s| secs_to_duration(*s));
    flush(&mut current, &mut first, end);

    words
}
