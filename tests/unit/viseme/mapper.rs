use super::*;

fn track(samples: Vec<f32>, sr: u32) -> AudioTrack {
    AudioTrack::from_pcm(samples, sr).unwrap()
}

fn assert_contiguous(frames: &[VisemeFrame], total: Duration) {
    assert_eq!(frames[0].start, Duration::ZERO);
    for w in frames.windows(2) {
        assert_eq!(w[0].end(), w[1].start);
        assert_eq!(w[0].index + 1, w[1].index);
    }
    let sum: Duration = frames.iter().map(|f| f.duration).sum();
    assert_eq!(sum, total);
    assert_eq!(frames.last().unwrap().end(), total);
}

#[test]
fn frames_tile_the_track_exactly() {
    // 1.2 s at 44.1 kHz is 14.4 windows of 1/12 s.
    let audio = track(vec![0.3; 52_920], 44_100);
    let frames = map_visemes(&audio, &VisemeConfig::default()).unwrap();
    assert_contiguous(&frames, Duration::from_millis(1200));
    assert_eq!(frames.len(), 15);
}

#[test]
fn final_partial_window_is_clamped() {
    let audio = track(vec![0.3; 1_050], 1_000);
    let cfg = VisemeConfig {
        window_secs: 0.1,
        ..VisemeConfig::default()
    };
    let frames = map_visemes(&audio, &cfg).unwrap();
    assert_eq!(frames.len(), 11);
    assert_eq!(frames[10].duration, Duration::from_millis(50));
    assert_contiguous(&frames, Duration::from_millis(1050));
}

#[test]
fn silence_is_closed_and_loud_is_wide() {
    let mut samples = vec![0.0f32; 100];
    samples.extend(std::iter::repeat_n(0.8f32, 100));
    samples.extend(std::iter::repeat_n(0.3f32, 100));
    let cfg = VisemeConfig {
        window_secs: 0.1,
        ..VisemeConfig::default()
    };
    let frames = map_visemes(&track(samples, 1_000), &cfg).unwrap();
    let shapes: Vec<_> = frames.iter().map(|f| f.shape).collect();
    assert_eq!(shapes, [MouthShape::Closed, MouthShape::Wide, MouthShape::Open]);
    assert!((frames[1].energy - 0.8).abs() < 1e-6);
}

#[test]
fn quiet_track_stays_closed_below_floor() {
    let cfg = VisemeConfig {
        window_secs: 0.1,
        ..VisemeConfig::default()
    };
    let frames = map_visemes(&track(vec![0.005; 500], 1_000), &cfg).unwrap();
    assert!(frames.iter().all(|f| f.shape == MouthShape::Closed));
}

#[test]
fn absolute_levels_when_not_normalized() {
    let cfg = VisemeConfig {
        window_secs: 0.1,
        normalize: false,
        ..VisemeConfig::default()
    };
    let frames = map_visemes(&track(vec![0.3; 100], 1_000), &cfg).unwrap();
    assert_eq!(frames[0].shape, MouthShape::Open);
}

#[test]
fn mapping_is_deterministic() {
    let samples: Vec<f32> = (0..4_410).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
    let audio = track(samples, 44_100);
    let a = map_visemes(&audio, &VisemeConfig::default()).unwrap();
    let b = map_visemes(&audio, &VisemeConfig::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn invalid_configs_are_rejected() {
    let bad = [
        VisemeConfig {
            window_secs: 0.0,
            ..VisemeConfig::default()
        },
        VisemeConfig {
            window_secs: f64::NAN,
            ..VisemeConfig::default()
        },
        VisemeConfig {
            window_secs: 1e-9,
            ..VisemeConfig::default()
        },
        VisemeConfig {
            open_threshold: 0.7,
            wide_threshold: 0.5,
            ..VisemeConfig::default()
        },
        VisemeConfig {
            silence_floor: -1.0,
            ..VisemeConfig::default()
        },
    ];
    for cfg in bad {
        assert!(cfg.validate().is_err(), "{cfg:?}");
        let audio = track(vec![0.1; 10], 10);
        assert!(matches!(
            map_visemes(&audio, &cfg),
            Err(ReelError::Validation(_))
        ));
    }
}

#[test]
fn one_millisecond_window_is_the_floor() {
    let cfg = VisemeConfig {
        window_secs: 0.001,
        ..VisemeConfig::default()
    };
    cfg.validate().unwrap();
    let frames = map_visemes(&track(vec![0.2; 50], 1_000), &cfg).unwrap();
    assert_eq!(frames.len(), 50);
}
