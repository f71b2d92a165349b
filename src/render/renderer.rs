use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    encode::{
        ensure_parent_dir,
        sink::{AudioInputConfig, CaptionInput, MediaSink, SinkConfig},
    },
    foundation::{
        core::{Canvas, FrameIndex},
        error::{ReelError, ReelResult},
    },
    render::{CharacterLayers, ass_script},
    scene::{ClipSource, Layer, SceneConfig, Timeline},
    speech::{AudioTrack, retry::CancelToken},
    viseme::MouthShape,
};

/// Encoder choices handed to the media service.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub video_codec: String,
    pub audio_codec: String,
    /// Replace an existing output file.
    pub overwrite: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            overwrite: true,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> ReelResult<()> {
        if self.video_codec.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err(ReelError::validation("render codecs must be non-empty"));
        }
        Ok(())
    }
}

/// The finished artifact.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RenderedOutput {
    pub path: PathBuf,
    /// Video duration: frame count divided by frame rate.
    pub duration: Duration,
    pub resolution: Canvas,
    pub video_codec: String,
    pub audio_codec: String,
    pub frames: u64,
}

/// Deletes the file on drop unless disarmed.
struct TempFileGuard(Option<PathBuf>);

impl TempFileGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

const CANCEL_CHECK_EVERY: u64 = 64;

/// Render `timeline` with `audio` into `out_path` through `sink`.
///
/// The sink writes a hidden partial file next to `out_path`; it is renamed into place only after
/// the sink finishes cleanly. On any failure the sink is aborted and every temporary file (partial
/// video, raw audio, caption script) is removed.
#[tracing::instrument(skip_all, fields(out = %out_path.display()))]
pub fn render(
    timeline: &Timeline,
    audio: &AudioTrack,
    out_path: &Path,
    scene: &SceneConfig,
    cfg: &RenderConfig,
    sink: &mut dyn MediaSink,
    cancel: &CancelToken,
) -> ReelResult<RenderedOutput> {
    if timeline.total_duration != audio.total_duration() {
        return Err(ReelError::timeline(format!(
            "timeline length {:?} does not match narration length {:?}",
            timeline.total_duration,
            audio.total_duration()
        )));
    }
    let (stem, ext) = match (out_path.file_stem(), out_path.extension()) {
        (Some(stem), Some(ext)) if !ext.is_empty() => (
            stem.to_string_lossy().into_owned(),
            ext.to_string_lossy().into_owned(),
        ),
        _ => {
            return Err(ReelError::validation(format!(
                "output path '{}' needs a file name with an extension",
                out_path.display()
            )));
        }
    };
    if !cfg.overwrite && out_path.exists() {
        return Err(ReelError::validation(format!(
            "output file '{}' already exists",
            out_path.display()
        )));
    }
    ensure_parent_dir(out_path).map_err(as_render_error)?;

    let dir = out_path.parent().unwrap_or(Path::new(""));
    let tag = format!(
        "{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    );
    let partial = dir.join(format!(".{stem}.partial-{tag}.{ext}"));
    let mut partial_guard = TempFileGuard(Some(partial.clone()));

    let audio_path = dir.join(format!(".{stem}.audio-{tag}.f32le"));
    let _audio_guard = TempFileGuard(Some(audio_path.clone()));
    audio.write_f32le(&audio_path)?;

    let mut captions_guard = TempFileGuard(None);
    let captions = match ass_script(timeline, scene) {
        Some(script) => {
            let path = dir.join(format!(".{stem}.captions-{tag}.ass"));
            captions_guard.0 = Some(path.clone());
            std::fs::write(&path, script).map_err(|e| {
                ReelError::render(format!(
                    "failed to write caption script '{}': {e}",
                    path.display()
                ))
            })?;
            Some(CaptionInput {
                script: path,
                fonts_dir: scene
                    .caption_style
                    .font_path
                    .as_deref()
                    .and_then(Path::parent)
                    .map(Path::to_path_buf),
            })
        }
        None => None,
    };

    let layers = CharacterLayers::load(scene)?;
    let frame_count = scene.fps.frames_covering(timeline.total_duration);
    let sink_cfg = SinkConfig {
        canvas: scene.canvas,
        fps: scene.fps,
        frame_count,
        background: scene.background.clone(),
        audio: AudioInputConfig {
            path: audio_path.clone(),
            sample_rate: audio.sample_rate(),
            channels: 1,
        },
        captions,
        video_codec: cfg.video_codec.clone(),
        audio_codec: cfg.audio_codec.clone(),
        out_path: partial.clone(),
    };

    let streamed = stream_frames(timeline, &layers, sink_cfg, sink, cancel);
    if let Err(err) = streamed {
        sink.abort();
        // An interrupt can kill the encoder before the next cancel check sees it.
        if cancel.is_cancelled() {
            return Err(ReelError::Cancelled);
        }
        return Err(as_render_error(err));
    }

    place_output(&partial, out_path, cfg.overwrite)?;
    if cfg.overwrite {
        partial_guard.disarm();
    }

    let output = RenderedOutput {
        path: out_path.to_path_buf(),
        duration: scene.fps.frame_start(FrameIndex(frame_count)),
        resolution: scene.canvas,
        video_codec: cfg.video_codec.clone(),
        audio_codec: cfg.audio_codec.clone(),
        frames: frame_count,
    };
    tracing::info!(
        frames = output.frames,
        secs = output.duration.as_secs_f64(),
        "rendered video"
    );
    Ok(output)
}

fn stream_frames(
    timeline: &Timeline,
    layers: &CharacterLayers,
    cfg: SinkConfig,
    sink: &mut dyn MediaSink,
    cancel: &CancelToken,
) -> ReelResult<()> {
    let fps = cfg.fps;
    let frame_count = cfg.frame_count;
    cancel.check()?;
    sink.begin(cfg)?;

    let shapes: Vec<(Duration, MouthShape)> = timeline
        .layer(Layer::Character)
        .filter_map(|c| match c.source {
            ClipSource::Character { shape, .. } => Some((c.end(), shape)),
            _ => None,
        })
        .collect();
    let mut cursor = 0usize;

    for i in 0..frame_count {
        if i % CANCEL_CHECK_EVERY == 0 {
            cancel.check()?;
        }
        let t = fps.frame_start(FrameIndex(i));
        while cursor + 1 < shapes.len() && t >= shapes[cursor].0 {
            cursor += 1;
        }
        let shape = shapes.get(cursor).map_or(MouthShape::Closed, |s| s.1);
        sink.push_frame(FrameIndex(i), layers.get(shape))?;
    }
    cancel.check()?;
    sink.end()
}

/// Move the finished partial file to `out_path`.
///
/// Without `overwrite` the partial is hard-linked, which fails if `out_path` appeared while
/// rendering; the caller's guard then removes the partial name.
fn place_output(partial: &Path, out_path: &Path, overwrite: bool) -> ReelResult<()> {
    let move_err = |e: std::io::Error| {
        ReelError::render(format!(
            "failed to move '{}' into place at '{}': {e}",
            partial.display(),
            out_path.display()
        ))
    };
    if overwrite {
        return std::fs::rename(partial, out_path).map_err(move_err);
    }
    match std::fs::hard_link(partial, out_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(ReelError::validation(format!(
                "output file '{}' already exists",
                out_path.display()
            )))
        }
        Err(e) => {
            tracing::debug!(error = %e, "hard link unavailable; copying instead");
            if out_path.exists() {
                return Err(ReelError::validation(format!(
                    "output file '{}' already exists",
                    out_path.display()
                )));
            }
            std::fs::copy(partial, out_path).map(|_| ()).map_err(move_err)
        }
    }
}

fn as_render_error(err: ReelError) -> ReelError {
    match err {
        ReelError::Other(e) => ReelError::render(format!("{e:#}")),
        other => other,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/renderer.rs"]
mod tests;
