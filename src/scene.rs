//! Scene assets and the clip timeline built from them.

pub mod composer;
pub mod timeline;

use std::path::{Path, PathBuf};

use crate::{
    foundation::{
        core::{Canvas, Fps},
        error::{ReelError, ReelResult},
    },
    viseme::MouthShape,
};

pub use composer::{ComposedScene, compose};
pub use timeline::{Clip, ClipSource, Layer, Timeline};

/// Layer 0 of the video.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundSource {
    Color { rgb: [u8; 3] },
    Image { path: PathBuf },
    /// Looped for the whole narration.
    Video { path: PathBuf },
}

impl Default for BackgroundSource {
    fn default() -> Self {
        Self::Color { rgb: [18, 20, 28] }
    }
}

/// Artwork for the talking character, one image per mouth shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CharacterArt {
    /// Built-in drawn face.
    #[default]
    Procedural,
    Sprites {
        closed: PathBuf,
        open: PathBuf,
        wide: PathBuf,
    },
}

impl CharacterArt {
    /// Sprite directory convention: `closed.png`, `open.png`, `wide.png`.
    pub fn from_dir(dir: &Path) -> Self {
        Self::Sprites {
            closed: dir.join("closed.png"),
            open: dir.join("open.png"),
            wide: dir.join("wide.png"),
        }
    }

    pub fn sprite_for(&self, shape: MouthShape) -> Option<&Path> {
        match self {
            Self::Procedural => None,
            Self::Sprites { closed, open, wide } => Some(match shape {
                MouthShape::Closed => closed,
                MouthShape::Open => open,
                MouthShape::Wide => wide,
            }),
        }
    }
}

/// Where the character sits: scaled to a fraction of canvas height and anchored bottom-left.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Placement {
    pub height_fraction: f32,
    /// Horizontal offset of the sprite's left edge; may be negative.
    pub left: i32,
    /// How far the sprite extends below the bottom edge.
    pub bottom_overhang: i32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            height_fraction: 0.5,
            left: -40,
            bottom_overhang: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionMode {
    /// One caption per text segment.
    #[default]
    Segments,
    /// One caption per spoken word (needs provider alignment).
    Words,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    /// TrueType/OpenType file; the media service's default font when unset.
    pub font_path: Option<PathBuf>,
    pub font_size: u32,
    pub primary_rgb: [u8; 3],
    pub outline_rgb: [u8; 3],
    pub outline_width: u32,
    pub margin_bottom: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: 70,
            primary_rgb: [255, 255, 255],
            outline_rgb: [0, 0, 0],
            outline_width: 2,
            margin_bottom: 160,
        }
    }
}

/// Visual assets and layout for one reel.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    pub background: BackgroundSource,
    pub character: CharacterArt,
    pub placement: Placement,
    pub captions: CaptionMode,
    pub caption_style: CaptionStyle,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas {
                width: 1080,
                height: 1920,
            },
            fps: Fps { num: 30, den: 1 },
            background: BackgroundSource::default(),
            character: CharacterArt::default(),
            placement: Placement::default(),
            captions: CaptionMode::default(),
            caption_style: CaptionStyle::default(),
        }
    }
}

impl SceneConfig {
    pub fn validate(&self) -> ReelResult<()> {
        self.canvas.validate()?;
        Fps::new(self.fps.num, self.fps.den)?;

        let h = self.placement.height_fraction;
        if !(h.is_finite() && h > 0.0 && h <= 1.0) {
            return Err(ReelError::validation(format!(
                "placement height_fraction must be in (0, 1], got {h}"
            )));
        }
        if self.caption_style.font_size == 0 {
            return Err(ReelError::validation("caption font_size must be > 0"));
        }

        match &self.background {
            BackgroundSource::Image { path } | BackgroundSource::Video { path } => {
                require_file(path, "background")?
            }
            BackgroundSource::Color { .. } => {}
        }
        for shape in MouthShape::ALL {
            if let Some(path) = self.character.sprite_for(shape) {
                require_file(path, &format!("{} sprite", shape.as_str()))?;
            }
        }
        if let Some(font) = &self.caption_style.font_path {
            require_file(font, "caption font")?;
        }
        Ok(())
    }
}

fn require_file(path: &Path, what: &str) -> ReelResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ReelError::validation(format!("{what} path is empty")));
    }
    if !path.is_file() {
        return Err(ReelError::validation(format!(
            "{what} file '{}' does not exist",
            path.display()
        )));
    }
    Ok(())
}
