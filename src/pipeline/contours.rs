use crate::mask::{BACKGROUND, FOREGROUND};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use super::geometry::{fill_polygon, perimeter, polygon_area, simplify_closed, Bounds};

/// A connected foreground region that passed the wall shape filter
#[derive(Debug, Clone, PartialEq)]
pub struct WallRegion {
    /// Simplified outer boundary, closed
    pub outline: Vec<Point<i32>>,
    /// Area enclosed by the traced boundary, in pixels²
    pub area: f64,
    pub bounds: Bounds,
}

impl WallRegion {
    pub fn aspect_ratio(&self) -> f32 {
        self.bounds.aspect_ratio()
    }
}

/// Candidate counts for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContourStats {
    pub candidates: usize,
    pub rejected: usize,
}

/// Extracts outer contours of 8-connected foreground regions and keeps the
/// ones shaped like walls.
#[derive(Debug)]
pub struct ContourFilter {
    foreground_level: u8,
    min_area: f64,
    min_aspect: f32,
    max_aspect: f32,
    simplify_epsilon: f64,
    // Binarized input with a one pixel border
    binary: GrayImage,
}

impl ContourFilter {
    pub fn new(
        foreground_level: u8,
        min_area: f64,
        min_aspect: f32,
        max_aspect: f32,
        simplify_epsilon: f64,
    ) -> Self {
        Self {
            foreground_level,
            min_area,
            min_aspect,
            max_aspect,
            simplify_epsilon,
            binary: GrayImage::new(0, 0),
        }
    }

    pub fn set_foreground_level(&mut self, level: u8) {
        self.foreground_level = level;
    }

    pub fn set_min_area(&mut self, min_area: f64) {
        self.min_area = min_area;
    }

    pub fn set_aspect_bounds(&mut self, min_aspect: f32, max_aspect: f32) {
        self.min_aspect = min_aspect;
        self.max_aspect = max_aspect;
    }

    pub fn set_simplify_epsilon(&mut self, epsilon: f64) {
        self.simplify_epsilon = epsilon;
    }

    /// Whether `bounds` has a wall-like aspect ratio.
    ///
    /// Tall-thin and wide-thin regions are treated alike: the test passes if
    /// either `w/h` or `h/w` lies within the bounds.
    pub fn accepts_aspect(&self, bounds: &Bounds) -> bool {
        let ratio = bounds.aspect_ratio();
        let within = |r: f32| r >= self.min_aspect && r <= self.max_aspect;
        within(ratio) || within(ratio.recip())
    }

    fn accepts(&self, area: f64, bounds: &Bounds) -> bool {
        area >= self.min_area && self.accepts_aspect(bounds)
    }

    /// Filter `smoothed` into `output`.
    ///
    /// `output` is cleared and receives the filled interiors of surviving
    /// regions; `regions` is cleared and receives their descriptions.
    pub fn apply(
        &mut self,
        smoothed: &GrayImage,
        output: &mut GrayImage,
        regions: &mut Vec<WallRegion>,
    ) -> ContourStats {
        let _span = tracing::debug_span!("contours").entered();

        debug_assert_eq!(smoothed.dimensions(), output.dimensions());

        output.fill(BACKGROUND);
        regions.clear();

        self.binarize(smoothed);

        let mut stats = ContourStats::default();
        for contour in find_contours::<i32>(&self.binary) {
            if contour.border_type != BorderType::Outer {
                continue;
            }
            stats.candidates += 1;

            let points: Vec<Point<i32>> = contour
                .points
                .iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();

            let Some(bounds) = Bounds::of(&points) else {
                continue;
            };
            let area = polygon_area(&points);
            if !self.accepts(area, &bounds) {
                tracing::trace!(
                    "Rejected region at ({}, {}) {}x{} area={:.1}",
                    bounds.x,
                    bounds.y,
                    bounds.width,
                    bounds.height,
                    area
                );
                stats.rejected += 1;
                continue;
            }

            fill_polygon(output, &points, FOREGROUND);

            let epsilon = self.simplify_epsilon * perimeter(&points);
            regions.push(WallRegion {
                outline: simplify_closed(&points, epsilon),
                area,
                bounds,
            });
        }

        stats
    }

    /// Binarize `smoothed` into the scratch image with a one pixel background
    /// border. The tracer never starts an outer border on the first column,
    /// so regions touching the frame edge must not touch the traced image's.
    fn binarize(&mut self, smoothed: &GrayImage) {
        let (width, height) = smoothed.dimensions();
        if self.binary.dimensions() != (width + 2, height + 2) {
            self.binary = GrayImage::new(width + 2, height + 2);
        } else {
            self.binary.fill(BACKGROUND);
        }

        let level = self.foreground_level;
        let stride = (width + 2) as usize;
        let padded: &mut [u8] = &mut self.binary;
        for (y, row) in smoothed.chunks_exact(width.max(1) as usize).enumerate() {
            let start = (y + 1) * stride + 1;
            for (dst, &src) in padded[start..start + row.len()].iter_mut().zip(row) {
                *dst = if src >= level { FOREGROUND } else { BACKGROUND };
            }
        }
    }
}
