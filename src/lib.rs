#![forbid(unsafe_code)]
//! Narrated short videos from text: segment, synthesize, lip-flap, compose, render.

pub mod config;
pub mod encode;
pub mod foundation;
pub mod pipeline;
pub mod render;
pub mod scene;
pub mod speech;
pub mod text;
pub mod viseme;

pub use config::PipelineConfig;
pub use encode::{FfmpegSink, InMemorySink, MediaSink};
pub use foundation::core::{Canvas, Fps, FrameIndex};
pub use foundation::error::{ErrorKind, ReelError, ReelResult, SynthesisCause};
pub use pipeline::{Pipeline, PipelineError, PipelineState, RunReport, Stage};
pub use render::RenderedOutput;
pub use scene::{BackgroundSource, CaptionMode, CharacterArt, SceneConfig, Timeline};
pub use speech::{
    AudioTrack, CharAlignment, Speech, SpeechSynthesizer, Voice,
    elevenlabs::{ElevenLabsSynthesizer, ProviderConfig},
    narration::SynthesisMode,
    retry::{CancelToken, RetryPolicy},
    tone::ToneSynthesizer,
};
pub use text::{TextSegment, segment_text};
pub use viseme::{MouthShape, VisemeFrame};
