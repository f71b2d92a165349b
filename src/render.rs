//! Turning a composed timeline and the narration into the final video file.

pub mod captions;
pub mod layers;
pub mod renderer;

pub use captions::ass_script;
pub use layers::{CharacterLayers, FrameRGBA};
pub use renderer::{RenderConfig, RenderedOutput, render};
