use super::*;

fn cfg(max: usize) -> SegmenterConfig {
    SegmenterConfig {
        max_caption_chars: max,
        ..SegmenterConfig::default()
    }
}

fn assert_tiles(text: &str, segs: &[TextSegment]) {
    let joined: String = segs.iter().map(|s| &text[s.span.clone()]).collect();
    assert_eq!(joined, text);
    for (i, s) in segs.iter().enumerate() {
        assert_eq!(s.index, i);
        assert!(!s.text.is_empty());
    }
    let no_ws = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    let texts: String = segs.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(no_ws(&texts), no_ws(text));
}

#[test]
fn single_sentence_is_one_segment() {
    let segs = segment_text("Hello world.", &cfg(60)).unwrap();
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].text, "Hello world.");
    assert_eq!(segs[0].span, 0..12);
    assert_eq!(segs[0].timing, TimingSource::Estimated);
}

#[test]
fn splits_on_sentence_terminals() {
    let text = "Hi there! How are you?  I'm fine... Thanks.";
    let segs = segment_text(text, &cfg(60)).unwrap();
    let texts: Vec<_> = segs.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, ["Hi there!", "How are you?", "I'm fine...", "Thanks."]);
    assert_tiles(text, &segs);
}

#[test]
fn decimals_and_missing_space_do_not_split() {
    let text = "Pi is 3.14 roughly.It works";
    let segs = segment_text(text, &cfg(60)).unwrap();
    assert_eq!(segs.len(), 1);
    assert_tiles(text, &segs);
}

#[test]
fn closing_quotes_stay_with_sentence() {
    let text = "He said \"stop.\" Then he left.";
    let segs = segment_text(text, &cfg(60)).unwrap();
    assert_eq!(segs[0].text, "He said \"stop.\"");
    assert_eq!(segs[1].text, "Then he left.");
}

#[test]
fn long_sentence_prefers_clause_punctuation() {
    let text = "This sentence is long, and it keeps going well past the limit";
    let segs = segment_text(text, &cfg(30)).unwrap();
    assert_eq!(segs[0].text, "This sentence is long,");
    assert!(segs.iter().all(|s| s.char_count() <= 30));
    assert_tiles(text, &segs);
}

#[test]
fn long_sentence_falls_back_to_whitespace_then_hard_cut() {
    let text = "alpha beta gamma delta epsilon zeta";
    let segs = segment_text(text, &cfg(12)).unwrap();
    assert!(segs.iter().all(|s| s.char_count() <= 12));
    assert_eq!(segs[0].text, "alpha beta");
    assert_tiles(text, &segs);

    let word = "abcdefghijklmnopqrstuvwxyz";
    let segs = segment_text(word, &cfg(10)).unwrap();
    let texts: Vec<_> = segs.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, ["abcdefghij", "klmnopqrst", "uvwxyz"]);
}

#[test]
fn multibyte_text_is_cut_on_char_boundaries() {
    let text = "日本語のテキストです。次の文。ÉÀÜ ÉÀÜ ÉÀÜ ÉÀÜ!";
    let segs = segment_text(text, &cfg(8)).unwrap();
    assert!(segs.iter().all(|s| s.char_count() <= 8));
    assert_tiles(text, &segs);
}

#[test]
fn whitespace_around_input_is_kept_in_spans() {
    let text = "  Leading space. Trailing space.   ";
    let segs = segment_text(text, &cfg(60)).unwrap();
    assert_eq!(segs.len(), 2);
    assert_eq!(segs[0].text, "Leading space.");
    assert_tiles(text, &segs);
}

#[test]
fn estimates_are_contiguous() {
    let segs = segment_text("One two. Three four five.", &cfg(60)).unwrap();
    for w in segs.windows(2) {
        assert_eq!(w[0].end(), w[1].start);
    }
    assert!(segs[1].duration > segs[0].duration);
}

#[test]
fn empty_input_is_a_validation_error() {
    for text in ["", "   ", "\n\t"] {
        let err = segment_text(text, &cfg(60)).unwrap_err();
        assert!(matches!(err, ReelError::Validation(_)));
    }
}

#[test]
fn coverage_holds_for_assorted_inputs() {
    let inputs = [
        "a",
        "Wait... what?! No way.",
        "no punctuation at all but quite a lot of words strung together here",
        "Comma, separated; clauses: everywhere, all, the, time, really.",
        "Ends with space. ",
        "?",
    ];
    for max in [1, 5, 20, 80] {
        for text in inputs {
            let segs = segment_text(text, &cfg(max)).unwrap();
            assert_tiles(text, &segs);
        }
    }
}
