use std::path::Path;

use image::{Rgba, RgbaImage, imageops::FilterType};

use crate::{
    foundation::{
        core::Canvas,
        error::{ReelError, ReelResult},
    },
    scene::{CharacterArt, Placement, SceneConfig},
    viseme::MouthShape,
};

/// One full-canvas RGBA8 frame, straight alpha, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRGBA {
    pub fn transparent(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            data: vec![0; canvas.rgba_len()],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// The character layer pre-rendered once per mouth shape.
///
/// Every video frame is one of these three buffers, so rendering a frame is a lookup.
#[derive(Clone, Debug)]
pub struct CharacterLayers {
    closed: FrameRGBA,
    open: FrameRGBA,
    wide: FrameRGBA,
}

impl CharacterLayers {
    pub fn load(scene: &SceneConfig) -> ReelResult<Self> {
        let target_h = sprite_height(scene.canvas, &scene.placement);
        let layer = |shape: MouthShape| -> ReelResult<FrameRGBA> {
            let sprite = match &scene.character {
                CharacterArt::Procedural => procedural_sprite(shape, target_h),
                art => {
                    let path = art.sprite_for(shape).ok_or_else(|| {
                        ReelError::render(format!("no {} sprite configured", shape.as_str()))
                    })?;
                    load_sprite(path, target_h)?
                }
            };
            Ok(place(scene.canvas, &scene.placement, &sprite))
        };
        Ok(Self {
            closed: layer(MouthShape::Closed)?,
            open: layer(MouthShape::Open)?,
            wide: layer(MouthShape::Wide)?,
        })
    }

    pub fn get(&self, shape: MouthShape) -> &FrameRGBA {
        match shape {
            MouthShape::Closed => &self.closed,
            MouthShape::Open => &self.open,
            MouthShape::Wide => &self.wide,
        }
    }
}

pub(crate) fn sprite_height(canvas: Canvas, placement: &Placement) -> u32 {
    ((canvas.height as f32 * placement.height_fraction).round() as u32).max(1)
}

fn load_sprite(path: &Path, target_h: u32) -> ReelResult<RgbaImage> {
    let img = image::open(path)
        .map_err(|e| {
            ReelError::render(format!("failed to decode sprite '{}': {e}", path.display()))
        })?
        .to_rgba8();
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ReelError::render(format!(
            "sprite '{}' is empty",
            path.display()
        )));
    }
    let target_w = ((u64::from(w) * u64::from(target_h)) / u64::from(h)).max(1) as u32;
    Ok(image::imageops::resize(&img, target_w, target_h, FilterType::Triangle))
}

/// A simple drawn face: head, two eyes and a mouth whose height follows `shape`.
fn procedural_sprite(shape: MouthShape, side: u32) -> RgbaImage {
    let s = side as f32;
    let mut img = RgbaImage::new(side, side);
    let skin = Rgba([242, 201, 155, 255]);
    let eye = Rgba([34, 30, 40, 255]);
    let mouth = Rgba([110, 26, 38, 255]);
    let mouth_ry = match shape {
        MouthShape::Closed => 0.012,
        MouthShape::Open => 0.06,
        MouthShape::Wide => 0.11,
    };

    fill_ellipse(&mut img, (0.5 * s, 0.5 * s), (0.45 * s, 0.45 * s), skin);
    fill_ellipse(&mut img, (0.35 * s, 0.4 * s), (0.05 * s, 0.05 * s), eye);
    fill_ellipse(&mut img, (0.65 * s, 0.4 * s), (0.05 * s, 0.05 * s), eye);
    fill_ellipse(&mut img, (0.5 * s, 0.68 * s), (0.16 * s, mouth_ry * s), mouth);
    img
}

fn fill_ellipse(img: &mut RgbaImage, (cx, cy): (f32, f32), (rx, ry): (f32, f32), color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let y0 = (cy - ry).floor().max(0.0) as u32;
    let y1 = ((cy + ry).ceil().max(0.0) as u32).min(h);
    let x0 = (cx - rx).floor().max(0.0) as u32;
    let x1 = ((cx + rx).ceil().max(0.0) as u32).min(w);
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                img.put_pixel(x, y, color);
            }
        }
    }
}

/// Put `sprite` on a transparent canvas: left edge at `placement.left`, bottom edge
/// `placement.bottom_overhang` pixels below the canvas. Out-of-canvas pixels are clipped.
fn place(canvas: Canvas, placement: &Placement, sprite: &RgbaImage) -> FrameRGBA {
    let mut frame = FrameRGBA::transparent(canvas);
    let (sw, sh) = sprite.dimensions();
    let left = i64::from(placement.left);
    let top = i64::from(canvas.height) - i64::from(sh) + i64::from(placement.bottom_overhang);
    let stride = canvas.width as usize * 4;

    for sy in 0..sh {
        let y = top + i64::from(sy);
        if y < 0 || y >= i64::from(canvas.height) {
            continue;
        }
        for sx in 0..sw {
            let x = left + i64::from(sx);
            if x < 0 || x >= i64::from(canvas.width) {
                continue;
            }
            let px = sprite.get_pixel(sx, sy).0;
            if px[3] == 0 {
                continue;
            }
            let i = y as usize * stride + x as usize * 4;
            frame.data[i..i + 4].copy_from_slice(&px);
        }
    }
    frame
}
