//! The end-to-end run: text → segments → narration → visemes → timeline → video.

use std::{fmt, path::Path};

use crate::{
    config::PipelineConfig,
    encode::MediaSink,
    foundation::error::{ErrorKind, ReelError, ReelResult},
    render::{RenderedOutput, render},
    scene::{ComposedScene, Timeline, compose},
    speech::{
        AudioTrack, SpeechSynthesizer,
        narration::{Narration, synthesize_narration},
        retry::CancelToken,
    },
    text::{TextSegment, segment_text},
    viseme::{VisemeFrame, map_visemes},
};

/// A pipeline stage, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    Segmenting,
    Synthesizing,
    MappingVisemes,
    Composing,
    Rendering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Segmenting => "segmenting",
            Self::Synthesizing => "synthesizing",
            Self::MappingVisemes => "mapping visemes",
            Self::Composing => "composing",
            Self::Rendering => "rendering",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PipelineState {
    Idle,
    Running(Stage),
    /// Every stage but rendering finished; see [`Pipeline::prepare`].
    Prepared,
    /// The video was rendered.
    Done,
    /// Terminal; records where the run stopped and why.
    Failed {
        stage: Stage,
        kind: ErrorKind,
    },
}

/// A failure tagged with the stage it came from.
#[derive(thiserror::Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ReelError,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Everything computed before rendering. All of it is immutable once built.
#[derive(Clone, Debug)]
pub struct Prepared {
    pub audio: AudioTrack,
    pub segments: Vec<TextSegment>,
    pub frames: Vec<VisemeFrame>,
    pub timeline: Timeline,
    pub retries: u32,
}

/// Summary of a successful run.
#[derive(Clone, Debug, serde::Serialize)]
pub struct RunReport {
    pub output: RenderedOutput,
    pub segments: Vec<TextSegment>,
    pub frames: Vec<VisemeFrame>,
    pub timeline: Timeline,
    pub retries: u32,
}

#[derive(Debug)]
struct StateLog {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl StateLog {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    fn enter(&mut self, state: PipelineState) {
        tracing::debug!(?state, "pipeline state");
        self.state = state;
        self.history.push(state);
    }

    fn step<T>(
        &mut self,
        stage: Stage,
        cancel: &CancelToken,
        f: impl FnOnce() -> ReelResult<T>,
    ) -> Result<T, PipelineError> {
        self.enter(PipelineState::Running(stage));
        match cancel.check().and_then(|()| f()) {
            Ok(v) => Ok(v),
            Err(source) => {
                let kind = source.kind();
                tracing::error!(%stage, %kind, error = %source, "pipeline failed");
                self.enter(PipelineState::Failed { stage, kind });
                Err(PipelineError { stage, source })
            }
        }
    }
}

/// One configured narration-to-video run.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    synth: &'a dyn SpeechSynthesizer,
    cancel: CancelToken,
    log: StateLog,
}

impl<'a> Pipeline<'a> {
    /// Validates `config` up front; nothing runs until [`Pipeline::run`] or [`Pipeline::prepare`].
    pub fn new(config: PipelineConfig, synth: &'a dyn SpeechSynthesizer) -> ReelResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            synth,
            cancel: CancelToken::new(),
            log: StateLog::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that aborts the run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.log.state
    }

    /// Every state the current run has passed through, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.log.history
    }

    /// Run every stage except rendering.
    #[tracing::instrument(skip_all, fields(provider = self.synth.name(), chars = text.chars().count()))]
    pub fn prepare(&mut self, text: &str) -> Result<Prepared, PipelineError> {
        self.log = StateLog::new();
        let prepared = self.prepare_stages(text)?;
        self.log.enter(PipelineState::Prepared);
        Ok(prepared)
    }

    /// Run all stages and write the video to `out_path` through `sink`.
    #[tracing::instrument(skip_all, fields(provider = self.synth.name(), out = %out_path.display()))]
    pub fn run(
        &mut self,
        text: &str,
        out_path: &Path,
        sink: &mut dyn MediaSink,
    ) -> Result<RunReport, PipelineError> {
        self.log = StateLog::new();
        let prepared = self.prepare_stages(text)?;

        let cfg = &self.config;
        let cancel = &self.cancel;
        let output = self.log.step(Stage::Rendering, cancel, || {
            render(
                &prepared.timeline,
                &prepared.audio,
                out_path,
                &cfg.scene,
                &cfg.render,
                sink,
                cancel,
            )
        })?;
        self.log.enter(PipelineState::Done);

        tracing::info!(
            out = %output.path.display(),
            segments = prepared.segments.len(),
            frames = prepared.frames.len(),
            retries = prepared.retries,
            "pipeline done"
        );
        Ok(RunReport {
            output,
            segments: prepared.segments,
            frames: prepared.frames,
            timeline: prepared.timeline,
            retries: prepared.retries,
        })
    }

    fn prepare_stages(&mut self, text: &str) -> Result<Prepared, PipelineError> {
        let cfg = &self.config;
        let cancel = &self.cancel;
        let synth = self.synth;

        let segments = self.log.step(Stage::Segmenting, cancel, || {
            segment_text(text, &cfg.segmenter)
        })?;

        let Narration {
            audio,
            segments,
            words,
            retries,
        } = self.log.step(Stage::Synthesizing, cancel, || {
            synthesize_narration(
                synth,
                text,
                &segments,
                &cfg.voice,
                &cfg.synthesis,
                &cfg.retry,
                cancel,
            )
        })?;

        let frames = self.log.step(Stage::MappingVisemes, cancel, || {
            map_visemes(&audio, &cfg.viseme)
        })?;

        let ComposedScene { timeline, segments } = self.log.step(Stage::Composing, cancel, || {
            compose(
                &frames,
                &segments,
                &words,
                audio.total_duration(),
                &cfg.scene,
            )
        })?;

        Ok(Prepared {
            audio,
            segments,
            frames,
            timeline,
            retries,
        })
    }
}
