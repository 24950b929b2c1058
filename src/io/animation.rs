use crate::types::{CbersError, CbersResult, Frame};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Default display time of each frame (seconds)
pub const DEFAULT_FRAME_DURATION: f64 = 0.5;

/// NeuQuant speed handed to the GIF encoder (1 = best quality, 30 = fastest)
const QUANTIZER_SPEED: i32 = 10;

/// Writes an ordered frame sequence as a looping animated GIF
#[derive(Debug, Clone)]
pub struct AnimationAssembler {
    frame_duration: f64,
}

impl Default for AnimationAssembler {
    fn default() -> Self {
        Self {
            frame_duration: DEFAULT_FRAME_DURATION,
        }
    }
}

impl AnimationAssembler {
    pub fn new(frame_duration: f64) -> CbersResult<Self> {
        if !frame_duration.is_finite() || frame_duration <= 0.0 {
            return Err(CbersError::InvalidInput(format!(
                "Frame duration must be positive, got {}",
                frame_duration
            )));
        }
        Ok(Self { frame_duration })
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    /// Encode `frames` in order into `output`.
    ///
    /// Returns `None` without creating a file when there is nothing to encode.
    pub fn assemble<P: AsRef<Path>>(&self, frames: &[Frame], output: P) -> CbersResult<Option<PathBuf>> {
        let output = output.as_ref();
        if frames.is_empty() {
            log::info!("No frames to encode, {} not written", output.display());
            return Ok(None);
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let delay_ms = (self.frame_duration * 1000.0).round() as u32;
        let delay = Delay::from_numer_denom_ms(delay_ms, 1);

        let writer = BufWriter::new(File::create(output)?);
        let mut encoder = GifEncoder::new_with_speed(writer, QUANTIZER_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;

        for frame in frames {
            let rgba = DynamicImage::ImageRgb8(frame.image.clone()).into_rgba8();
            encoder.encode_frame(image::Frame::from_parts(rgba, 0, 0, delay))?;
        }
        // Trailer is written when the encoder goes away
        drop(encoder);

        log::info!("Wrote {} frames to {}", frames.len(), output.display());
        Ok(Some(output.to_path_buf()))
    }
}
