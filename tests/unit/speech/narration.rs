use std::sync::{
    Mutex,
    atomic::{AtomicU32, Ordering},
};

use super::*;
use crate::{
    foundation::error::SynthesisCause,
    speech::{CharAlignment, tone::ToneSynthesizer},
    text::{SegmenterConfig, TimingSource, segment_text},
};

fn tone() -> ToneSynthesizer {
    ToneSynthesizer {
        sample_rate: 1_000,
        char_duration: Duration::from_millis(10),
        pitch_hz: 50.0,
    }
}

fn segs(text: &str) -> Vec<TextSegment> {
    segment_text(text, &SegmenterConfig::default()).unwrap()
}

fn tiles(segments: &[TextSegment], total: Duration) {
    assert_eq!(segments[0].start, Duration::ZERO);
    for w in segments.windows(2) {
        assert_eq!(w[0].end(), w[1].start);
    }
    assert_eq!(segments.last().unwrap().end(), total);
}

/// Returns a fixed track with no alignment.
struct Silent {
    samples: usize,
}

impl SpeechSynthesizer for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    fn synthesize(&self, _text: &str, _voice: &Voice) -> ReelResult<Speech> {
        Ok(Speech {
            audio: AudioTrack::from_pcm(vec![0.0; self.samples], 1_000)?,
            alignment: None,
        })
    }
}

#[test]
fn whole_text_uses_provider_alignment() {
    let text = "Hello there. General Kenobi.";
    let input = segs(text);
    let out = synthesize_narration(
        &tone(),
        text,
        &input,
        &Voice::default(),
        &SynthesisConfig::default(),
        &RetryPolicy::no_delay(0),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(out.audio.total_duration(), Duration::from_millis(280));
    assert_eq!(out.segments.len(), 2);
    // "General" is char 13.
    assert_eq!(out.segments[1].start, Duration::from_millis(130));
    assert!(out.segments.iter().all(|s| s.timing == TimingSource::Provider));
    tiles(&out.segments, out.audio.total_duration());

    let words: Vec<_> = out.words.iter().map(|w| (w.text.as_str(), w.segment)).collect();
    assert_eq!(
        words,
        [("Hello", 0), ("there.", 0), ("General", 1), ("Kenobi.", 1)]
    );
    assert_eq!(out.retries, 0);
}

#[test]
fn whole_text_without_alignment_keeps_estimates() {
    let text = "One. Two.";
    let input = segs(text);
    let out = synthesize_narration(
        &Silent { samples: 500 },
        text,
        &input,
        &Voice::default(),
        &SynthesisConfig::default(),
        &RetryPolicy::no_delay(0),
        &CancelToken::new(),
    )
    .unwrap();
    assert!(out.segments.iter().all(|s| s.timing == TimingSource::Estimated));
    assert!(out.words.is_empty());
}

#[test]
fn mismatched_alignment_is_ignored() {
    struct Wrong;
    impl SpeechSynthesizer for Wrong {
        fn name(&self) -> &str {
            "wrong"
        }
        fn synthesize(&self, _text: &str, _voice: &Voice) -> ReelResult<Speech> {
            Ok(Speech {
                audio: AudioTrack::from_pcm(vec![0.0; 100], 1_000)?,
                alignment: Some(CharAlignment {
                    characters: vec!["x".into()],
                    start_secs: vec![0.0],
                    end_secs: vec![0.1],
                }),
            })
        }
    }

    let text = "A. B.";
    let out = synthesize_narration(
        &Wrong,
        text,
        &segs(text),
        &Voice::default(),
        &SynthesisConfig::default(),
        &RetryPolicy::no_delay(0),
        &CancelToken::new(),
    )
    .unwrap();
    assert!(out.segments.iter().all(|s| s.timing == TimingSource::Estimated));
}

#[test]
fn per_segment_reassembles_by_index_and_sums_exactly() {
    let text = "First one here. Two. A third, longer sentence.";
    let input = segs(text);
    let cfg = SynthesisConfig {
        mode: SynthesisMode::PerSegment,
        max_concurrency: 3,
    };
    let out = synthesize_narration(
        &tone(),
        text,
        &input,
        &Voice::default(),
        &cfg,
        &RetryPolicy::no_delay(0),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(out.segments.len(), 3);
    for (seg, orig) in out.segments.iter().zip(&input) {
        assert_eq!(seg.index, orig.index);
        assert_eq!(seg.text, orig.text);
        // Each slice is 10 ms per char of the trimmed segment.
        assert_eq!(seg.duration, Duration::from_millis(10) * orig.char_count() as u32);
    }
    tiles(&out.segments, out.audio.total_duration());

    let starts: Vec<_> = out.words.iter().map(|w| w.start).collect();
    assert!(starts.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(out.words[0].text, "First");
    assert_eq!(out.words.last().unwrap().segment, 2);
}

#[test]
fn per_segment_retries_are_summed() {
    struct Flaky {
        failures_left: Mutex<u32>,
    }
    impl SpeechSynthesizer for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }
        fn synthesize(&self, text: &str, voice: &Voice) -> ReelResult<Speech> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(ReelError::synthesis(SynthesisCause::Timeout, "slow"));
            }
            drop(left);
            tone().synthesize(text, voice)
        }
    }

    let text = "One. Two.";
    let out = synthesize_narration(
        &Flaky {
            failures_left: Mutex::new(2),
        },
        text,
        &segs(text),
        &Voice::default(),
        &SynthesisConfig {
            mode: SynthesisMode::PerSegment,
            max_concurrency: 1,
        },
        &RetryPolicy::no_delay(3),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(out.retries, 2);
}

#[test]
fn per_segment_fatal_error_fails_the_run() {
    struct FailSecond {
        calls: AtomicU32,
    }
    impl SpeechSynthesizer for FailSecond {
        fn name(&self) -> &str {
            "fail"
        }
        fn synthesize(&self, text: &str, voice: &Voice) -> ReelResult<Speech> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.starts_with("Two") {
                return Err(ReelError::synthesis(
                    SynthesisCause::BadRequest(422),
                    "unprocessable",
                ));
            }
            tone().synthesize(text, voice)
        }
    }

    let text = "One. Two. Three.";
    let synth = FailSecond {
        calls: AtomicU32::new(0),
    };
    let err = synthesize_narration(
        &synth,
        text,
        &segs(text),
        &Voice::default(),
        &SynthesisConfig {
            mode: SynthesisMode::PerSegment,
            max_concurrency: 2,
        },
        &RetryPolicy::no_delay(3),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ReelError::Synthesis {
            cause: SynthesisCause::BadRequest(422),
            ..
        }
    ));
    // Once "Two." fails, segments not yet started are skipped.
    let calls = synth.calls.load(Ordering::SeqCst);
    assert!((1..=3).contains(&calls), "calls = {calls}");
}

/// "One." is rejected outright; every other segment keeps answering 503.
struct RejectFirst {
    retried_calls: AtomicU32,
}

impl SpeechSynthesizer for RejectFirst {
    fn name(&self) -> &str {
        "reject-first"
    }

    fn synthesize(&self, text: &str, _voice: &Voice) -> ReelResult<Speech> {
        if text == "One." {
            return Err(ReelError::synthesis(
                SynthesisCause::Unauthorized(401),
                "invalid api key",
            ));
        }
        self.retried_calls.fetch_add(1, Ordering::SeqCst);
        Err(ReelError::synthesis(SynthesisCause::Server(503), "busy"))
    }
}

#[test]
fn fatal_segment_stops_siblings_in_backoff() {
    let text = "One. Two.";
    let synth = RejectFirst {
        retried_calls: AtomicU32::new(0),
    };
    let started = std::time::Instant::now();
    let err = synthesize_narration(
        &synth,
        text,
        &segs(text),
        &Voice::default(),
        &SynthesisConfig {
            mode: SynthesisMode::PerSegment,
            max_concurrency: 2,
        },
        &RetryPolicy {
            max_retries: 3,
            base_delay_ms: 300,
            max_delay_ms: 4_000,
        },
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ReelError::Synthesis {
            cause: SynthesisCause::Unauthorized(401),
            ..
        }
    ));
    // Full backoff for "Two." would be 300 + 600 + 1200 ms.
    assert!(
        started.elapsed() < Duration::from_millis(900),
        "took {:?}",
        started.elapsed()
    );
    assert!(synth.retried_calls.load(Ordering::SeqCst) <= 2);
}

#[test]
fn retry_budget_is_per_run_not_per_segment() {
    /// Every segment fails transiently on its first two calls.
    struct TwiceEach {
        calls: Mutex<std::collections::HashMap<String, u32>>,
    }
    impl SpeechSynthesizer for TwiceEach {
        fn name(&self) -> &str {
            "twice-each"
        }
        fn synthesize(&self, text: &str, voice: &Voice) -> ReelResult<Speech> {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(text.to_string()).or_insert(0);
            *n += 1;
            if *n <= 2 {
                return Err(ReelError::synthesis(SynthesisCause::RateLimited, "slow down"));
            }
            drop(calls);
            tone().synthesize(text, voice)
        }
    }

    let text = "One. Two. Three.";
    let synth = TwiceEach {
        calls: Mutex::new(Default::default()),
    };
    let err = synthesize_narration(
        &synth,
        text,
        &segs(text),
        &Voice::default(),
        &SynthesisConfig {
            mode: SynthesisMode::PerSegment,
            max_concurrency: 3,
        },
        &RetryPolicy::no_delay(3),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(err.is_transient());
    let total: u32 = synth.calls.lock().unwrap().values().sum();
    assert!(total <= 3 + 3, "total calls = {total}");

    // The same failures fit once the run-wide budget covers them.
    let synth = TwiceEach {
        calls: Mutex::new(Default::default()),
    };
    let out = synthesize_narration(
        &synth,
        text,
        &segs(text),
        &Voice::default(),
        &SynthesisConfig {
            mode: SynthesisMode::PerSegment,
            max_concurrency: 3,
        },
        &RetryPolicy::no_delay(6),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(out.retries, 6);
}

#[test]
fn zero_concurrency_is_rejected() {
    let cfg = SynthesisConfig {
        mode: SynthesisMode::PerSegment,
        max_concurrency: 0,
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn char_lookup_follows_spans() {
    let text = "Ab. Cd.";
    let lookup = char_segment_lookup(text, &segs(text));
    assert_eq!(lookup, [0, 0, 0, 0, 1, 1, 1]);
}
