use crate::error::{PipelineError, Result};
use crate::mask::{BACKGROUND, FOREGROUND};
use image::GrayImage;
use rayon::prelude::*;
use rayon::ThreadPool;

/// Square structuring element anchored at `size / 2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuringElement {
    size: usize,
}

impl StructuringElement {
    pub fn square(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(PipelineError::InvalidKernel { size });
        }
        Ok(Self { size })
    }

    /// Neighbours covered (before, after) the anchor along one axis
    fn reach(&self) -> (usize, usize) {
        let before = self.size / 2;
        (before, self.size - 1 - before)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Erode,
    Dilate,
}

/// Erosion followed by dilation over a binary mask.
///
/// Out-of-bounds neighbours are background, so erosion eats into regions
/// touching the mask edge. With no valid structuring element the stage
/// copies its input through unchanged.
#[derive(Debug)]
pub struct MorphologyStage {
    element: Option<StructuringElement>,
    erode_iterations: usize,
    dilate_iterations: usize,
    warned: bool,
    // Horizontal pass output, reused between passes
    line: Vec<u8>,
}

impl MorphologyStage {
    pub fn new(kernel_size: usize, erode_iterations: usize, dilate_iterations: usize) -> Self {
        let mut stage = Self {
            element: None,
            erode_iterations,
            dilate_iterations,
            warned: false,
            line: Vec::new(),
        };
        stage.set_kernel_size(kernel_size);
        stage
    }

    pub fn set_kernel_size(&mut self, kernel_size: usize) {
        match StructuringElement::square(kernel_size) {
            Ok(element) => {
                self.element = Some(element);
                self.warned = false;
            }
            Err(e) => {
                self.element = None;
                self.warn_degraded(&e);
            }
        }
    }

    pub fn set_iterations(&mut self, erode_iterations: usize, dilate_iterations: usize) {
        self.erode_iterations = erode_iterations;
        self.dilate_iterations = dilate_iterations;
    }

    pub fn is_degraded(&self) -> bool {
        self.element.is_none()
    }

    fn warn_degraded(&mut self, cause: &PipelineError) {
        if !self.warned {
            tracing::warn!("Morphology stage disabled, passing masks through: {}", cause);
            self.warned = true;
        }
    }

    /// Run erosion then dilation over `src`.
    ///
    /// Intermediate and final results live in `buffers`, which must match the
    /// dimensions of `src`. Returns the index of the buffer holding the result.
    pub fn apply(
        &mut self,
        src: &GrayImage,
        buffers: &mut [GrayImage; 2],
        pool: Option<&ThreadPool>,
    ) -> usize {
        let _span = tracing::debug_span!("morphology").entered();

        let (width, height) = src.dimensions();
        let (width, height) = (width as usize, height as usize);

        buffers[0].copy_from_slice(src.as_raw());

        let Some(element) = self.element else {
            return 0;
        };
        if width == 0 || height == 0 {
            return 0;
        }

        self.line.resize(width * height, BACKGROUND);

        let passes = std::iter::repeat(Op::Erode)
            .take(self.erode_iterations)
            .chain(std::iter::repeat(Op::Dilate).take(self.dilate_iterations));

        let mut current = 0;
        for op in passes {
            let (a, b) = buffers.split_at_mut(1);
            let (input, output) = if current == 0 {
                (&a[0], &mut b[0])
            } else {
                (&b[0], &mut a[0])
            };

            let line = &mut self.line;
            let mut pass = || {
                horizontal_pass(input.as_raw(), line, width, element, op);
                vertical_pass(line, output, width, height, element, op);
            };
            match pool {
                Some(pool) => pool.install(pass),
                None => pass(),
            }

            current = 1 - current;
        }

        current
    }
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: usize, element: StructuringElement, op: Op) {
    let (before, after) = element.reach();

    dst.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(out, row)| {
            for (x, value) in out.iter_mut().enumerate() {
                let hit = match op {
                    Op::Erode => {
                        x >= before
                            && x + after < width
                            && row[x - before..=x + after].iter().all(|&v| v != BACKGROUND)
                    }
                    Op::Dilate => {
                        let lo = x.saturating_sub(before);
                        let hi = (x + after).min(width - 1);
                        row[lo..=hi].iter().any(|&v| v != BACKGROUND)
                    }
                };
                *value = if hit { FOREGROUND } else { BACKGROUND };
            }
        });
}

fn vertical_pass(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    element: StructuringElement,
    op: Op,
) {
    let (before, after) = element.reach();

    dst.par_chunks_mut(width).enumerate().for_each(|(y, out)| {
        let in_bounds = y >= before && y + after < height;
        if op == Op::Erode && !in_bounds {
            out.fill(BACKGROUND);
            return;
        }

        let lo = y.saturating_sub(before);
        let hi = (y + after).min(height - 1);
        let rows = &src[lo * width..(hi + 1) * width];

        for (x, value) in out.iter_mut().enumerate() {
            let mut column = rows.iter().skip(x).step_by(width);
            let hit = match op {
                Op::Erode => column.all(|&v| v != BACKGROUND),
                Op::Dilate => column.any(|&v| v != BACKGROUND),
            };
            *value = if hit { FOREGROUND } else { BACKGROUND };
        }
    });
}
