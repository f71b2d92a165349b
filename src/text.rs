//! Input text handling: sentence/clause segmentation and segment timing.

pub mod segmenter;

pub use segmenter::{SegmenterConfig, TextSegment, TimingSource, segment_text};
