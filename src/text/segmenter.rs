use std::{ops::Range, time::Duration};

use crate::foundation::error::{ReelError, ReelResult};

/// Where a segment's start/duration came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TimingSource {
    /// Chars-per-second guess made before synthesis.
    Estimated,
    /// Derived from synthesis metadata (alignment or per-segment audio length).
    Provider,
    /// Total duration distributed by character count.
    Proportional,
}

/// A sentence- or clause-level chunk of the input text.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextSegment {
    pub index: usize,
    /// Display text, whitespace-trimmed.
    pub text: String,
    /// Byte range in the source text. Spans of consecutive segments tile the source exactly.
    pub span: Range<usize>,
    pub start: Duration,
    pub duration: Duration,
    pub timing: TimingSource,
}

impl TextSegment {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub(crate) fn retimed(&self, start: Duration, duration: Duration, timing: TimingSource) -> Self {
        Self {
            start,
            duration,
            timing,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Sentences longer than this (in chars) are split at clause boundaries.
    pub max_caption_chars: usize,
    /// Speaking rate used for pre-synthesis estimates.
    pub chars_per_second: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_caption_chars: 60,
            chars_per_second: 15.0,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> ReelResult<()> {
        if self.max_caption_chars == 0 {
            return Err(ReelError::validation("max_caption_chars must be > 0"));
        }
        if !self.chars_per_second.is_finite() || self.chars_per_second <= 0.0 {
            return Err(ReelError::validation(
                "chars_per_second must be finite and > 0",
            ));
        }
        Ok(())
    }
}

/// Split `text` into ordered segments covering the whole input.
///
/// Sentences end at terminal punctuation followed by whitespace (or end of input). Sentences longer
/// than `max_caption_chars` are cut at the last clause punctuation, else the last whitespace, else
/// hard at the limit. Whitespace after a cut belongs to the segment before it.
#[tracing::instrument(skip(text), fields(len = text.len()))]
pub fn segment_text(text: &str, cfg: &SegmenterConfig) -> ReelResult<Vec<TextSegment>> {
    cfg.validate()?;
    if text.trim().is_empty() {
        return Err(ReelError::validation("input text is empty"));
    }

    let mut spans = Vec::new();
    for sentence in sentence_spans(text) {
        spans.extend(split_clauses(text, sentence, cfg.max_caption_chars));
    }

    let mut segments = Vec::with_capacity(spans.len());
    let mut cursor = Duration::ZERO;
    for (index, span) in spans.into_iter().enumerate() {
        let display = text[span.clone()].trim().to_string();
        let duration =
            Duration::from_secs_f64(display.chars().count() as f64 / cfg.chars_per_second);
        segments.push(TextSegment {
            index,
            text: display,
            span,
            start: cursor,
            duration,
            timing: TimingSource::Estimated,
        });
        cursor += duration;
    }

    tracing::debug!(segments = segments.len(), "segmented input text");
    Ok(segments)
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…' | '。' | '！' | '？')
}

fn is_full_width_terminal(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '}' | '”' | '’' | '»' | '」' | '』')
}

fn is_clause_punct(c: char) -> bool {
    matches!(c, ',' | ';' | ':' | '—' | '–' | '、' | '，' | '；')
}

fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |j: usize| chars.get(j).map_or(text.len(), |(b, _)| *b);

    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i].1;
        if !is_terminal(c) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && (is_terminal(chars[j].1) || is_closing(chars[j].1)) {
            j += 1;
        }
        // Full-width terminators end a sentence even without a following space.
        let ends = j == chars.len() || chars[j].1.is_whitespace() || is_full_width_terminal(c);
        if ends {
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            let end = byte_at(j);
            spans.push(start..end);
            start = end;
        }
        i = j;
    }
    if start < text.len() {
        spans.push(start..text.len());
    }
    spans
}

fn split_clauses(text: &str, span: Range<usize>, max_chars: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = span.start;
    while start < span.end {
        let rest = &text[start..span.end];
        let lead = rest.len() - rest.trim_start().len();
        let body = &rest[lead..];
        if body.trim_end().chars().count() <= max_chars {
            out.push(start..span.end);
            break;
        }

        let mut end = start + lead + clause_cut(body, max_chars);
        let tail = &text[end..span.end];
        end += tail.len() - tail.trim_start().len();
        out.push(start..end);
        start = end;
    }
    out
}

/// Byte offset in `body` after which to cut. `body` starts with a non-whitespace char and is longer
/// than `max_chars`; the returned offset is always > 0.
fn clause_cut(body: &str, max_chars: usize) -> usize {
    let mut best_clause = None;
    let mut best_space = None;
    let mut limit = body.len();
    for (n, (i, c)) in body.char_indices().enumerate() {
        if n >= max_chars {
            limit = i;
            break;
        }
        let next = i + c.len_utf8();
        if is_clause_punct(c) && body[next..].starts_with(char::is_whitespace) {
            best_clause = Some(next);
        } else if c.is_whitespace() && i > 0 {
            best_space = Some(i);
        }
    }
    best_clause.or(best_space).unwrap_or(limit)
}

#[cfg(test)]
#[path = "../../tests/unit/text/segmenter.rs"]
mod tests;
