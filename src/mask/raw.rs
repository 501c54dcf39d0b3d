use crate::error::{PipelineError, Result};
use image::GrayImage;
use ndarray::Array2;

use super::{BACKGROUND, FOREGROUND};

/// Per-pixel wall probability as emitted by the segmentation model.
///
/// Values are expected in 0.0-1.0. The grid has the model's output
/// resolution, which is independent of the camera resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMask {
    // (rows, cols) == (height, width)
    values: Array2<f32>,
}

impl RawMask {
    pub fn from_probabilities(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// Build from a row-major buffer of `width * height` probabilities
    pub fn from_vec(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let len = values.len();
        let values = Array2::from_shape_vec((height as usize, width as usize), values)
            .map_err(|_| PipelineError::LengthMismatch { width, height, len })?;
        Ok(Self { values })
    }

    /// Interpret an 8-bit intensity mask (0-255) as probabilities
    pub fn from_gray(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let values = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            image.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
        });
        Self { values }
    }

    pub fn width(&self) -> u32 {
        self.values.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.values.nrows() as u32
    }

    /// Returns (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Binarize into a preallocated buffer of the same dimensions.
    ///
    /// Pixels with probability `>= threshold` become foreground. NaN is
    /// background.
    pub fn threshold_into(&self, threshold: f32, out: &mut GrayImage) {
        debug_assert_eq!(out.dimensions(), self.dimensions());

        for (dst, &p) in out.pixels_mut().zip(self.values.iter()) {
            dst.0[0] = if p >= threshold { FOREGROUND } else { BACKGROUND };
        }
    }
}
