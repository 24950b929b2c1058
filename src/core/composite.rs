use crate::config::PipelineConfig;
use crate::types::{BandMatrix, CbersError, CbersResult, Frame};
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::fmt;
use std::path::Path;

/// Font used when no font file is configured
static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");

/// Default label text height (pixels)
pub const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Offset of the label box from the top-left corner
pub const LABEL_OFFSET: u32 = 5;
/// Space between the label box border and the text
pub const LABEL_PADDING: u32 = 5;

/// Font and pixel size used to draw frame labels
#[derive(Clone)]
pub struct LabelFont {
    font: FontArc,
    scale: PxScale,
}

impl fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelFont").field("scale", &self.scale.y).finish()
    }
}

impl LabelFont {
    /// The bundled DejaVu Sans Mono
    pub fn embedded(size: f32) -> CbersResult<Self> {
        let font = FontArc::try_from_slice(EMBEDDED_FONT)
            .map_err(|e| CbersError::Font(format!("Embedded font is invalid: {}", e)))?;
        Self::with_font(font, size)
    }

    /// Any TrueType/OpenType font file
    pub fn from_file<P: AsRef<Path>>(path: P, size: f32) -> CbersResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| CbersError::Font(format!("Failed to read {}: {}", path.display(), e)))?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| CbersError::Font(format!("{} is not a usable font: {}", path.display(), e)))?;
        Self::with_font(font, size)
    }

    pub fn from_config(config: &PipelineConfig) -> CbersResult<Self> {
        match &config.font_path {
            Some(path) => Self::from_file(path, config.font_size),
            None => Self::embedded(config.font_size),
        }
    }

    fn with_font(font: FontArc, size: f32) -> CbersResult<Self> {
        if !size.is_finite() || size <= 0.0 {
            return Err(CbersError::Font(format!("Font size must be positive, got {}", size)));
        }
        Ok(Self {
            font,
            scale: PxScale::from(size),
        })
    }

    /// Rendered width and height of `text`
    pub fn text_size(&self, text: &str) -> (u32, u32) {
        text_size(self.scale, &self.font, text)
    }
}

/// Overlay text for a frame: scene position and acquisition date
pub fn frame_label(scene_no: usize, acquisition_date: &str) -> String {
    format!("{} {}", scene_no, acquisition_date)
}

/// Interleave three single-band matrices into an RGB image.
/// Channel order follows the slice order.
pub fn stack_rgb(bands: &[BandMatrix; 3]) -> CbersResult<RgbImage> {
    let dim = bands[0].dim();
    if bands.iter().any(|b| b.dim() != dim) {
        return Err(CbersError::InvalidInput(format!(
            "Band shapes differ: {:?}",
            bands.iter().map(|b| b.dim()).collect::<Vec<_>>()
        )));
    }
    let (height, width) = dim;

    let mut raw = Vec::with_capacity(height * width * 3);
    for ((r, g), b) in bands[0].iter().zip(bands[1].iter()).zip(bands[2].iter()) {
        raw.extend_from_slice(&[*r, *g, *b]);
    }

    RgbImage::from_raw(width as u32, height as u32, raw)
        .ok_or_else(|| CbersError::InvalidInput("RGB buffer does not match image size".to_string()))
}

fn blend(base: f64, value: u8, factor: f64) -> u8 {
    (base + factor * (value as f64 - base)).clamp(0.0, 255.0) as u8
}

/// Contrast enhancement: blend against a flat image of the mean luminance
pub fn adjust_contrast(image: &mut RgbImage, factor: f64) {
    if factor == 1.0 || image.width() == 0 || image.height() == 0 {
        return;
    }

    let total: u64 = image
        .pixels()
        .map(|p| {
            // ITU-R 601-2 luma, fixed point
            let [r, g, b] = p.0;
            (r as u64 * 19595 + g as u64 * 38470 + b as u64 * 7471 + 0x8000) >> 16
        })
        .sum();
    let count = image.width() as u64 * image.height() as u64;
    let mean = (total as f64 / count as f64 + 0.5).floor();

    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = blend(mean, *channel, factor);
        }
    }
}

/// Brightness enhancement: blend against black
pub fn adjust_brightness(image: &mut RgbImage, factor: f64) {
    if factor == 1.0 {
        return;
    }
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = blend(0.0, *channel, factor);
        }
    }
}

/// Black text on an opaque white box anchored near the top-left corner
pub fn draw_label(image: &mut RgbImage, text: &str, font: &LabelFont) {
    let (text_width, text_height) = font.text_size(text);
    let rect = Rect::at(LABEL_OFFSET as i32, LABEL_OFFSET as i32).of_size(
        text_width + 2 * LABEL_PADDING + 1,
        text_height + 2 * LABEL_PADDING + 1,
    );
    draw_filled_rect_mut(image, rect, Rgb([255, 255, 255]));
    draw_text_mut(
        image,
        Rgb([0, 0, 0]),
        (LABEL_OFFSET + LABEL_PADDING) as i32,
        (LABEL_OFFSET + LABEL_PADDING) as i32,
        font.scale,
        &font.font,
        text,
    );
}

/// Builds labelled RGB frames from stretched bands
#[derive(Debug, Clone)]
pub struct FrameCompositor {
    contrast: f64,
    brightness: f64,
    font: LabelFont,
}

impl FrameCompositor {
    pub fn new(contrast: f64, brightness: f64, font: LabelFont) -> CbersResult<Self> {
        for (name, factor) in [("contrast", contrast), ("brightness", brightness)] {
            if !factor.is_finite() || factor < 0.0 {
                return Err(CbersError::InvalidInput(format!(
                    "{} factor must be a non-negative number, got {}",
                    name, factor
                )));
            }
        }
        Ok(Self {
            contrast,
            brightness,
            font,
        })
    }

    /// Stack, enhance, then label. The label is always drawn last.
    pub fn compose(&self, bands: &[BandMatrix; 3], label: &str) -> CbersResult<Frame> {
        let mut image = stack_rgb(bands)?;
        adjust_contrast(&mut image, self.contrast);
        adjust_brightness(&mut image, self.brightness);
        draw_label(&mut image, label, &self.font);

        Ok(Frame {
            image,
            label: label.to_string(),
        })
    }
}
