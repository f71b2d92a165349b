use super::*;
use crate::{
    scene::{BackgroundSource, CharacterArt},
    text::{SegmenterConfig, segment_text},
    viseme::MouthShape,
};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn frames(total_ms: u64, step_ms: u64) -> Vec<VisemeFrame> {
    let mut out = Vec::new();
    let mut t = 0;
    while t < total_ms {
        let d = step_ms.min(total_ms - t);
        out.push(VisemeFrame {
            index: out.len(),
            shape: if out.len() % 2 == 0 {
                MouthShape::Closed
            } else {
                MouthShape::Open
            },
            start: ms(t),
            duration: ms(d),
            energy: 0.0,
        });
        t += d;
    }
    out
}

fn timed(text: &str, bounds_ms: &[u64]) -> Vec<TextSegment> {
    segment_text(text, &SegmenterConfig::default())
        .unwrap()
        .iter()
        .zip(bounds_ms.windows(2))
        .map(|(s, b)| s.retimed(ms(b[0]), ms(b[1] - b[0]), TimingSource::Provider))
        .collect()
}

fn word(text: &str, start: u64, end: u64, segment: usize) -> WordTiming {
    WordTiming {
        text: text.to_string(),
        start: ms(start),
        duration: ms(end - start),
        segment,
    }
}

#[test]
fn hello_world_single_segment() {
    let segs = timed("Hello world.", &[0, 1200]);
    let out = compose(&frames(1200, 83), &segs, &[], ms(1200), &SceneConfig::default()).unwrap();
    let tl = &out.timeline;

    let bg: Vec<_> = tl.layer(Layer::Background).collect();
    assert_eq!(bg.len(), 1);
    assert_eq!(bg[0].duration, ms(1200));

    let chars: Vec<_> = tl.layer(Layer::Character).collect();
    assert_eq!(chars.first().unwrap().start, Duration::ZERO);
    assert_eq!(chars.last().unwrap().end(), ms(1200));

    let caps: Vec<_> = tl.layer(Layer::Caption).collect();
    assert_eq!(caps.len(), 1);
    assert_eq!(caps[0].start, Duration::ZERO);
    assert_eq!(caps[0].duration, ms(1200));
}

#[test]
fn character_clips_mirror_frames_and_sprites() {
    let segs = timed("Hi.", &[0, 300]);
    let scene = SceneConfig {
        character: CharacterArt::from_dir(std::path::Path::new("art")),
        ..SceneConfig::default()
    };
    let f = frames(300, 100);
    let out = compose(&f, &segs, &[], ms(300), &scene).unwrap();
    let chars: Vec<_> = out.timeline.layer(Layer::Character).collect();
    assert_eq!(chars.len(), f.len());
    for (clip, frame) in chars.iter().zip(&f) {
        assert_eq!(clip.start, frame.start);
        assert_eq!(clip.duration, frame.duration);
        let ClipSource::Character { shape, sprite } = &clip.source else {
            panic!("expected character clip");
        };
        assert_eq!(*shape, frame.shape);
        assert_eq!(
            sprite.as_deref(),
            Some(std::path::Path::new("art").join(format!("{}.png", shape.as_str())).as_path())
        );
    }
}

#[test]
fn estimated_segments_fall_back_to_proportional() {
    let segs = segment_text("Short. Much longer sentence here.", &SegmenterConfig::default())
        .unwrap();
    let out = compose(&frames(1000, 100), &segs, &[], ms(1000), &SceneConfig::default()).unwrap();
    assert!(out
        .segments
        .iter()
        .all(|s| s.timing == TimingSource::Proportional));
    assert_eq!(out.segments.last().unwrap().end(), ms(1000));

    let caps: Vec<_> = out.timeline.layer(Layer::Caption).collect();
    assert_eq!(caps.len(), 2);
    assert_eq!(caps[0].end(), caps[1].start);
    assert!(caps[1].duration > caps[0].duration);
}

#[test]
fn word_captions_are_clamped_to_segments() {
    let segs = timed("Hi there. Bye.", &[0, 500, 800]);
    let words = [
        word("Hi", 0, 200, 0),
        word("there.", 200, 600, 0),
        word("Bye.", 550, 800, 1),
    ];
    let scene = SceneConfig {
        captions: CaptionMode::Words,
        ..SceneConfig::default()
    };
    let out = compose(&frames(800, 100), &segs, &words, ms(800), &scene).unwrap();
    let caps: Vec<_> = out.timeline.layer(Layer::Caption).collect();
    assert_eq!(caps.len(), 3);
    assert_eq!(caps[1].end(), ms(500));
    assert_eq!(caps[2].start, ms(550));
}

#[test]
fn word_mode_without_words_uses_segments() {
    let segs = timed("One. Two.", &[0, 400, 900]);
    let scene = SceneConfig {
        captions: CaptionMode::Words,
        ..SceneConfig::default()
    };
    let out = compose(&frames(900, 100), &segs, &[], ms(900), &scene).unwrap();
    assert_eq!(out.timeline.layer(Layer::Caption).count(), 2);
}

#[test]
fn frames_short_of_total_are_a_timeline_error() {
    let segs = timed("Hello.", &[0, 1000]);
    let err = compose(&frames(900, 100), &segs, &[], ms(1000), &SceneConfig::default())
        .unwrap_err();
    assert!(matches!(err, ReelError::Timeline(_)));
}

#[test]
fn provider_segments_past_total_are_rejected() {
    let segs = timed("Hello.", &[0, 1500]);
    let err = compose(&frames(1000, 100), &segs, &[], ms(1000), &SceneConfig::default())
        .unwrap_err();
    assert!(matches!(err, ReelError::Timeline(_)));
}

#[test]
fn zero_total_is_rejected() {
    let segs = timed("Hello.", &[0, 0]);
    assert!(compose(&[], &segs, &[], Duration::ZERO, &SceneConfig::default()).is_err());
}

#[test]
fn composition_is_deterministic() {
    let segs = timed("A. B. C.", &[0, 300, 600, 900]);
    let scene = SceneConfig {
        background: BackgroundSource::Color { rgb: [1, 2, 3] },
        ..SceneConfig::default()
    };
    let a = compose(&frames(900, 83), &segs, &[], ms(900), &scene).unwrap();
    let b = compose(&frames(900, 83), &segs, &[], ms(900), &scene).unwrap();
    assert_eq!(a, b);
}

#[test]
fn overlapping_character_clips_fail_validation() {
    let segs = timed("Hi.", &[0, 200]);
    let mut tl = compose(&frames(200, 100), &segs, &[], ms(200), &SceneConfig::default())
        .unwrap()
        .timeline;
    for c in tl.clips.iter_mut().filter(|c| c.layer == Layer::Character) {
        if c.start == ms(100) {
            c.start = ms(50);
            c.duration = ms(150);
        }
    }
    assert!(matches!(tl.validate(&segs), Err(ReelError::Timeline(_))));
}
