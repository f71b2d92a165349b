//! Media service boundary: frame sinks that turn rendered frames plus audio into a file.

pub mod ffmpeg;
pub mod sink;

pub use ffmpeg::{FfmpegSink, ensure_parent_dir, is_ffmpeg_on_path};
pub use sink::{AudioInputConfig, CaptionInput, InMemorySink, MediaSink, SinkConfig, SinkSummary};
