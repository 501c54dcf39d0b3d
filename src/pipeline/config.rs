/// Tunables for [`WallMaskPipeline`](super::WallMaskPipeline).
///
/// The iteration asymmetry (1 erode, 2 dilate) and the contour thresholds are
/// empirical defaults; retune them against real model output.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Probability at or above which a raw pixel counts as wall
    pub binary_threshold: f32,

    /// Side of the square structuring element
    pub kernel_size: usize,
    pub erode_iterations: usize,
    pub dilate_iterations: usize,

    pub temporal_enabled: bool,
    /// Weight of the current frame, higher is more responsive.
    ///
    /// Masks are re-binarized after smoothing, so at 0.5 or above a binary
    /// frame always wins and smoothing has no effect. Below 0.5 a region
    /// survives one missing frame and needs one frame to appear.
    pub blend_factor: f32,
    /// Reset temporal history when more than this fraction of pixels flips
    pub scene_cut_fraction: Option<f32>,

    /// Minimum enclosed contour area in pixels²
    pub min_contour_area: f64,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Polygon simplification tolerance as a fraction of contour perimeter
    pub simplify_epsilon: f64,

    /// Dedicated worker threads, 0 uses the global rayon pool
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 0.5,
            kernel_size: 3,
            erode_iterations: 1,
            dilate_iterations: 2,
            temporal_enabled: true,
            blend_factor: 0.4,
            scene_cut_fraction: None,
            min_contour_area: 100.0,
            min_aspect_ratio: 0.2,
            max_aspect_ratio: 5.0,
            simplify_epsilon: 0.02,
            workers: 0,
        }
    }
}

impl PipelineConfig {
    /// Foreground level on the 0-255 scale matching `binary_threshold`
    pub fn foreground_level(&self) -> u8 {
        (self.binary_threshold.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

pub(crate) fn clamp_blend(blend: f32) -> f32 {
    if blend.is_nan() {
        1.0
    } else {
        blend.clamp(0.0, 1.0)
    }
}
