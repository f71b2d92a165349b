use std::path::PathBuf;

use anyhow::Context as _;

use crate::{
    foundation::{
        core::{Canvas, Fps, FrameIndex},
        error::{ReelError, ReelResult},
    },
    render::FrameRGBA,
    scene::BackgroundSource,
};

/// Everything a [`MediaSink`] needs to know before the first frame arrives.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    /// Exact number of frames that will be pushed.
    pub frame_count: u64,
    /// Composited underneath the pushed frames.
    pub background: BackgroundSource,
    pub audio: AudioInputConfig,
    /// Subtitle script burned in on top of everything.
    pub captions: Option<CaptionInput>,
    pub video_codec: String,
    pub audio_codec: String,
    /// File the sink writes; the renderer moves it into place afterwards.
    pub out_path: PathBuf,
}

/// Raw PCM audio input for the muxed track.
#[derive(Debug, Clone)]
pub struct AudioInputConfig {
    /// Path to interleaved `f32le` PCM data.
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// An ASS caption script plus the directory its font lives in.
#[derive(Debug, Clone)]
pub struct CaptionInput {
    pub script: PathBuf,
    pub fonts_dir: Option<PathBuf>,
}

/// Sink contract for consuming the character layer in timeline order.
///
/// `push_frame` is called in strictly increasing `FrameIndex` order. After any error the caller
/// invokes `abort` instead of `end`, and the sink must leave nothing running.
pub trait MediaSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()>;
    /// `frame` is straight-alpha RGBA8 at the canvas size.
    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()>;
    fn end(&mut self) -> ReelResult<()>;
    fn abort(&mut self);
}

/// What [`InMemorySink`] writes to its output path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SinkSummary {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub frames: u64,
    pub audio_samples: u64,
}

/// Sink for tests and dry runs.
///
/// Records frame indices, the last frame, the audio size and the caption script, then writes a
/// small JSON [`SinkSummary`] instead of a video.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<FrameIndex>,
    last_frame: Option<FrameRGBA>,
    audio_bytes: u64,
    caption_script: Option<String>,
    aborted: bool,
    fail_at: Option<u64>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `push_frame` fail at frame `idx`, simulating a media service crash.
    pub fn failing_at(idx: u64) -> Self {
        Self {
            fail_at: Some(idx),
            ..Self::default()
        }
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[FrameIndex] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRGBA> {
        self.last_frame.as_ref()
    }

    pub fn caption_script(&self) -> Option<&str> {
        self.caption_script.as_deref()
    }

    pub fn audio_samples(&self) -> u64 {
        let channels = self.cfg.as_ref().map_or(1, |c| u64::from(c.audio.channels.max(1)));
        self.audio_bytes / 4 / channels
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted
    }
}

impl MediaSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        self.audio_bytes = std::fs::metadata(&cfg.audio.path)
            .with_context(|| format!("audio input '{}' is missing", cfg.audio.path.display()))?
            .len();
        self.caption_script = cfg
            .captions
            .as_ref()
            .map(|c| std::fs::read_to_string(&c.script))
            .transpose()
            .context("failed to read caption script")?;
        self.cfg = Some(cfg);
        self.frames.clear();
        self.last_frame = None;
        self.aborted = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::render("in-memory sink not started"))?;
        if self.fail_at == Some(idx.0) {
            return Err(ReelError::render(format!(
                "simulated media failure at frame {}",
                idx.0
            )));
        }
        if let Some(last) = self.frames.last()
            && idx <= *last
        {
            return Err(ReelError::render("in-memory sink received out-of-order frame"));
        }
        if frame.width != cfg.canvas.width || frame.height != cfg.canvas.height {
            return Err(ReelError::render(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.canvas.width, cfg.canvas.height
            )));
        }
        self.frames.push(idx);
        self.last_frame = Some(frame.clone());
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::render("in-memory sink not started"))?;
        let summary = SinkSummary {
            width: cfg.canvas.width,
            height: cfg.canvas.height,
            fps_num: cfg.fps.num,
            fps_den: cfg.fps.den,
            frames: self.frames.len() as u64,
            audio_samples: self.audio_samples(),
        };
        let json = serde_json::to_vec_pretty(&summary).context("failed to encode sink summary")?;
        std::fs::write(&cfg.out_path, json)
            .with_context(|| format!("failed to write '{}'", cfg.out_path.display()))?;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
