use std::{fmt::Write as _, time::Duration};

use crate::scene::{CaptionStyle, ClipSource, Layer, SceneConfig, Timeline};

const DEFAULT_FONT: &str = "Arial";

/// Build an ASS subtitle script with one dialogue event per caption clip.
///
/// Returns `None` when the timeline has no caption clips.
pub fn ass_script(timeline: &Timeline, scene: &SceneConfig) -> Option<String> {
    let events: Vec<(Duration, Duration, &str)> = timeline
        .layer(Layer::Caption)
        .filter_map(|c| match &c.source {
            ClipSource::Caption { text, .. } if !c.duration.is_zero() => {
                Some((c.start, c.end(), text.as_str()))
            }
            _ => None,
        })
        .collect();
    if events.is_empty() {
        return None;
    }

    let mut out = String::new();
    out.push_str("[Script Info]\n");
    out.push_str("ScriptType: v4.00+\n");
    let _ = writeln!(out, "PlayResX: {}", scene.canvas.width);
    let _ = writeln!(out, "PlayResY: {}", scene.canvas.height);
    out.push_str("WrapStyle: 0\n");
    out.push_str("ScaledBorderAndShadow: yes\n\n");

    out.push_str("[V4+ Styles]\n");
    out.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    out.push_str(&style_line(&scene.caption_style));
    out.push('\n');

    out.push_str("[Events]\n");
    out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for (start, end, text) in events {
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            ass_time(start),
            ass_time(end),
            ass_text(text)
        );
    }
    Some(out)
}

/// Font family for the style line: the font file's stem, or a common default.
pub(crate) fn font_name(style: &CaptionStyle) -> String {
    style
        .font_path
        .as_deref()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FONT.to_string())
}

fn style_line(style: &CaptionStyle) -> String {
    format!(
        "Style: Default,{},{},{},&H000000FF,{},&H00000000,-1,0,0,0,100,100,0,0,1,{},0,2,40,40,{},1\n",
        font_name(style).replace(',', " "),
        style.font_size,
        ass_color(style.primary_rgb),
        ass_color(style.outline_rgb),
        style.outline_width,
        style.margin_bottom,
    )
}

/// `H:MM:SS.cc`, truncated to centiseconds.
fn ass_time(t: Duration) -> String {
    let cs = t.as_millis() / 10;
    let hours = cs / 360_000;
    let minutes = (cs % 360_000) / 6_000;
    let seconds = (cs % 6_000) / 100;
    let centis = cs % 100;
    format!("{hours}:{minutes:02}:{seconds:02}.{centis:02}")
}

/// ASS colours are `&HAABBGGRR`.
fn ass_color([r, g, b]: [u8; 3]) -> String {
    format!("&H00{b:02X}{g:02X}{r:02X}")
}

/// Keep caption text literal: no override blocks, no escape sequences, one line per event.
fn ass_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '{' => out.push('('),
            '}' => out.push(')'),
            '\\' => out.push('\u{29F5}'),
            '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}
