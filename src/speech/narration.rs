//! Narration synthesis: one request for the whole text, or one per segment in parallel.

use std::{sync::Mutex, time::Duration};

use rayon::prelude::*;

use crate::{
    foundation::error::{ReelError, ReelResult},
    speech::{
        AudioTrack, Speech, SpeechSynthesizer, Voice,
        retry::{Attempted, CancelToken, RetryBudget, RetryPolicy, with_retry},
        timing::{WordTiming, segments_from_alignment, segments_from_durations, words_from_alignment},
    },
    text::TextSegment,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// One request; segment boundaries come from the provider's character alignment.
    #[default]
    WholeText,
    /// One request per segment, issued concurrently and reassembled by index.
    PerSegment,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub mode: SynthesisMode,
    /// Upper bound on concurrent provider requests in per-segment mode.
    pub max_concurrency: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            mode: SynthesisMode::WholeText,
            max_concurrency: 4,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> ReelResult<()> {
        if self.max_concurrency == 0 {
            return Err(ReelError::validation("synthesis max_concurrency must be >= 1"));
        }
        Ok(())
    }
}

/// Everything synthesis produces for one run.
#[derive(Clone, Debug)]
pub struct Narration {
    pub audio: AudioTrack,
    /// Input segments, retimed where the provider confirmed timing.
    pub segments: Vec<TextSegment>,
    /// Word timing; empty when the provider gave no usable alignment.
    pub words: Vec<WordTiming>,
    /// Transient retries spent across all requests; never more than the policy's `max_retries`.
    pub retries: u32,
}

/// Synthesize `segments` (produced from `text`) into one narration track.
#[tracing::instrument(skip_all, fields(provider = synth.name(), mode = ?cfg.mode, segments = segments.len()))]
pub fn synthesize_narration(
    synth: &dyn SpeechSynthesizer,
    text: &str,
    segments: &[TextSegment],
    voice: &Voice,
    cfg: &SynthesisConfig,
    retry: &RetryPolicy,
    cancel: &CancelToken,
) -> ReelResult<Narration> {
    if segments.is_empty() {
        return Err(ReelError::validation("narration needs at least one segment"));
    }
    let budget = RetryBudget::new(retry.max_retries);
    match cfg.mode {
        SynthesisMode::WholeText => whole_text(synth, text, segments, voice, retry, &budget, cancel),
        SynthesisMode::PerSegment => {
            per_segment(synth, segments, voice, cfg, retry, &budget, cancel)
        }
    }
}

fn whole_text(
    synth: &dyn SpeechSynthesizer,
    text: &str,
    segments: &[TextSegment],
    voice: &Voice,
    retry: &RetryPolicy,
    budget: &RetryBudget,
    cancel: &CancelToken,
) -> ReelResult<Narration> {
    let Attempted { value, retries } = with_retry(retry, budget, cancel, "whole text", |_| {
        synth.synthesize(text, voice)
    })?;
    let Speech { audio, alignment } = value;
    let total = audio.total_duration();

    let (segments, words) = match alignment.filter(|a| a.matches_text(text)) {
        Some(a) => {
            let timed = segments_from_alignment(text, segments, &a, total);
            let char_to_segment = char_segment_lookup(text, segments);
            let words = words_from_alignment(&a, Duration::ZERO, |i| {
                char_to_segment.get(i).copied().unwrap_or(segments.len() - 1)
            });
            (timed, words)
        }
        None => {
            tracing::warn!("provider alignment missing or mismatched; segments keep estimated timing");
            (segments.to_vec(), Vec::new())
        }
    };

    tracing::info!(
        secs = total.as_secs_f64(),
        retries,
        words = words.len(),
        "synthesized narration"
    );
    Ok(Narration {
        audio,
        segments,
        words,
        retries,
    })
}

fn per_segment(
    synth: &dyn SpeechSynthesizer,
    segments: &[TextSegment],
    voice: &Voice,
    cfg: &SynthesisConfig,
    retry: &RetryPolicy,
    budget: &RetryBudget,
    cancel: &CancelToken,
) -> ReelResult<Narration> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.max_concurrency.min(segments.len()))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build synthesis thread pool: {e}"))?;

    // The first failure stops sibling requests; callers cancelling `cancel` still stops all of them.
    let siblings = cancel.child();
    let first_failure: Mutex<Option<ReelError>> = Mutex::new(None);

    // Collecting into a Vec keeps index order regardless of completion order.
    let collected: ReelResult<Vec<Attempted<Speech>>> = pool.install(|| {
        segments
            .par_iter()
            .map(|seg| {
                let label = format!("segment {}", seg.index);
                with_retry(retry, budget, &siblings, &label, |_| {
                    synth.synthesize(&seg.text, voice)
                })
                .map_err(|err| {
                    if !matches!(err, ReelError::Cancelled) {
                        tracing::debug!(segment = seg.index, error = %err, "stopping sibling requests");
                        siblings.cancel();
                        if let Ok(mut slot) = first_failure.lock()
                            && slot.is_none()
                        {
                            *slot = Some(err);
                            return ReelError::Cancelled;
                        }
                    }
                    err
                })
            })
            .collect()
    });

    let parts: Vec<Speech> = match collected {
        Ok(attempts) => attempts.into_iter().map(|a| a.value).collect(),
        Err(err) => {
            let first = first_failure.into_inner().ok().flatten();
            return Err(first.unwrap_or(err));
        }
    };
    let retries = budget.spent();

    let tracks: Vec<AudioTrack> = parts.iter().map(|p| p.audio.clone()).collect();
    let audio = AudioTrack::concat(&tracks)?;
    let total = audio.total_duration();
    let durations: Vec<Duration> = tracks.iter().map(AudioTrack::total_duration).collect();
    let timed = segments_from_durations(segments, &durations, total);

    let mut words = Vec::new();
    for ((seg, part), timed_seg) in segments.iter().zip(&parts).zip(&timed) {
        if let Some(a) = part.alignment.as_ref().filter(|a| a.matches_text(&seg.text)) {
            let idx = seg.index;
            words.extend(words_from_alignment(a, timed_seg.start, |_| idx));
        }
    }

    tracing::info!(
        secs = total.as_secs_f64(),
        retries,
        requests = parts.len(),
        "synthesized narration per segment"
    );
    Ok(Narration {
        audio,
        segments: timed,
        words,
        retries,
    })
}

/// Map each char index of `text` to the segment whose span contains it.
fn char_segment_lookup(text: &str, segments: &[TextSegment]) -> Vec<usize> {
    let mut out = Vec::with_capacity(text.len());
    let mut seg = 0usize;
    for (byte, _) in text.char_indices() {
        while seg + 1 < segments.len() && byte >= segments[seg].span.end {
            seg += 1;
        }
        out.push(seg);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/speech/narration.rs"]
mod tests;
