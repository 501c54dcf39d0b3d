use crate::error::{PipelineError, Result};
use crate::mask::RawMask;
use image::GrayImage;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::config::{clamp_blend, PipelineConfig};
use super::consumer::{MaskConsumer, ProcessedFrame, SubscriptionId};
use super::contours::{ContourFilter, WallRegion};
use super::morphology::MorphologyStage;
use super::temporal::{Smoothing, TemporalSmoother};

/// Per-frame wall mask post-processing.
///
/// Each call to [`process`](Self::process) runs threshold -> erosion and
/// dilation -> temporal smoothing -> contour filtering, in that order, and
/// publishes the result to every subscribed consumer before returning it.
/// Frames must be supplied in capture order. All buffers are allocated once
/// per mask resolution and reused; a resolution change reallocates them and
/// resets temporal state.
pub struct WallMaskPipeline {
    config: PipelineConfig,
    pool: Option<ThreadPool>,
    pool_failed: bool,

    dimensions: Option<(u32, u32)>,
    binary: GrayImage,
    scratch: [GrayImage; 2],
    output: GrayImage,
    regions: Vec<WallRegion>,

    morphology: MorphologyStage,
    temporal: TemporalSmoother,
    contours: ContourFilter,

    consumers: Vec<(SubscriptionId, Box<dyn MaskConsumer + Send>)>,
    next_subscription: u64,
    frames: u64,
}

impl WallMaskPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let morphology = MorphologyStage::new(
            config.kernel_size,
            config.erode_iterations,
            config.dilate_iterations,
        );
        let temporal = TemporalSmoother::new(
            config.temporal_enabled,
            config.blend_factor,
            config.scene_cut_fraction,
            config.foreground_level(),
        );
        let contours = ContourFilter::new(
            config.foreground_level(),
            config.min_contour_area,
            config.min_aspect_ratio,
            config.max_aspect_ratio,
            config.simplify_epsilon,
        );

        let mut pipeline = Self {
            config,
            pool: None,
            pool_failed: false,
            dimensions: None,
            binary: GrayImage::new(0, 0),
            scratch: [GrayImage::new(0, 0), GrayImage::new(0, 0)],
            output: GrayImage::new(0, 0),
            regions: Vec::new(),
            morphology,
            temporal,
            contours,
            consumers: Vec::new(),
            next_subscription: 0,
            frames: 0,
        };
        pipeline.ensure_pool();
        pipeline
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current mask resolution, once buffers are allocated
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// Number of frames published so far
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    fn ensure_pool(&mut self) {
        if self.pool.is_some() || self.pool_failed || self.config.workers == 0 {
            return;
        }

        let built = ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("wallmask-{}", i))
            .build();

        match built {
            Ok(pool) => {
                tracing::debug!("Worker pool started with {} threads", self.config.workers);
                self.pool = Some(pool);
            }
            Err(e) => {
                let e = PipelineError::from(e);
                tracing::warn!("{}, using the global rayon pool", e);
                self.pool_failed = true;
            }
        }
    }

    /// Allocate buffers for masks of `width` x `height` and reset temporal state
    pub fn resize(&mut self, width: u32, height: u32) {
        tracing::info!("Allocating mask buffers for {}x{}", width, height);

        self.ensure_pool();
        self.binary = GrayImage::new(width, height);
        self.scratch = [GrayImage::new(width, height), GrayImage::new(width, height)];
        self.output = GrayImage::new(width, height);
        self.regions.clear();
        self.temporal.resize(width, height);
        self.dimensions = Some((width, height));
    }

    /// Drop the previous frame so the next one is not blended.
    ///
    /// Call this on large camera motion or any other scene discontinuity.
    pub fn reset_temporal_state(&mut self) {
        tracing::info!("Resetting temporal state");
        self.temporal.reset();
    }

    /// Process one raw mask and publish the result.
    ///
    /// A missing or empty mask is rejected with an error and nothing is
    /// published for that cycle.
    pub fn process<'a>(
        &mut self,
        raw: impl Into<Option<&'a RawMask>>,
    ) -> Result<ProcessedFrame<'_>> {
        let Some(raw) = raw.into() else {
            tracing::error!("Rejected frame {}: no raw mask supplied", self.frames);
            return Err(PipelineError::MissingInput);
        };

        let (width, height) = raw.dimensions();
        if raw.is_empty() {
            tracing::error!("Rejected frame {}: empty {}x{} mask", self.frames, width, height);
            return Err(PipelineError::EmptyMask { width, height });
        }

        match self.dimensions {
            Some(dims) if dims == (width, height) => {}
            Some((old_width, old_height)) => {
                tracing::info!(
                    "Mask size changed from {}x{} to {}x{}",
                    old_width,
                    old_height,
                    width,
                    height
                );
                self.resize(width, height);
            }
            None => self.resize(width, height),
        }

        let _span = tracing::debug_span!("process_frame", index = self.frames).entered();

        raw.threshold_into(self.config.binary_threshold, &mut self.binary);

        let pool = self.pool.as_ref();
        let index = self.morphology.apply(&self.binary, &mut self.scratch, pool);
        let (smoothed, smoothing) = self.temporal.smooth(&self.scratch[index], pool);
        let stats = self
            .contours
            .apply(smoothed, &mut self.output, &mut self.regions);

        let frame = ProcessedFrame {
            index: self.frames,
            mask: &self.output,
            regions: &self.regions,
            rejected: stats.rejected,
            temporal_reset: smoothing == Smoothing::Seeded,
        };
        self.frames += 1;

        tracing::debug!(
            "Frame {}: {} wall regions, {} rejected, smoothing={:?}",
            frame.index,
            frame.regions.len(),
            frame.rejected,
            smoothing
        );

        for (_, consumer) in self.consumers.iter_mut() {
            consumer.on_mask_ready(&frame);
        }

        Ok(frame)
    }

    /// Register a consumer for every subsequently published frame
    pub fn subscribe<C>(&mut self, consumer: C) -> SubscriptionId
    where
        C: MaskConsumer + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.consumers.push((id, Box::new(consumer)));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|(existing, _)| *existing != id);
        self.consumers.len() != before
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Release every buffer, the worker pool and all subscriptions.
    ///
    /// The pipeline stays usable; the next `process` call reallocates.
    pub fn dispose(&mut self) {
        tracing::info!("Disposing pipeline after {} frames", self.frames);

        self.dimensions = None;
        self.binary = GrayImage::new(0, 0);
        self.scratch = [GrayImage::new(0, 0), GrayImage::new(0, 0)];
        self.output = GrayImage::new(0, 0);
        self.regions = Vec::new();
        self.temporal.resize(0, 0);
        self.consumers.clear();
        self.pool = None;
        self.pool_failed = false;
    }

    pub fn set_binary_threshold(&mut self, threshold: f32) {
        self.config.binary_threshold = threshold;
        let level = self.config.foreground_level();
        self.contours.set_foreground_level(level);
        self.temporal.set_foreground_level(level);
    }

    /// A size of 0 disables the morphology stage until a valid size is set
    pub fn set_kernel_size(&mut self, kernel_size: usize) {
        self.config.kernel_size = kernel_size;
        self.morphology.set_kernel_size(kernel_size);
    }

    pub fn set_erode_iterations(&mut self, iterations: usize) {
        self.config.erode_iterations = iterations;
        self.morphology
            .set_iterations(iterations, self.config.dilate_iterations);
    }

    pub fn set_dilate_iterations(&mut self, iterations: usize) {
        self.config.dilate_iterations = iterations;
        self.morphology
            .set_iterations(self.config.erode_iterations, iterations);
    }

    pub fn set_temporal_enabled(&mut self, enabled: bool) {
        self.config.temporal_enabled = enabled;
        self.temporal.set_enabled(enabled);
    }

    /// Clamped to [0, 1]
    pub fn set_blend_factor(&mut self, blend: f32) {
        self.config.blend_factor = clamp_blend(blend);
        self.temporal.set_blend_factor(blend);
    }

    pub fn set_scene_cut_fraction(&mut self, fraction: Option<f32>) {
        self.config.scene_cut_fraction = fraction;
        self.temporal.set_scene_cut_fraction(fraction);
    }

    pub fn set_min_contour_area(&mut self, area: f64) {
        self.config.min_contour_area = area;
        self.contours.set_min_area(area);
    }

    pub fn set_aspect_bounds(&mut self, min_aspect: f32, max_aspect: f32) {
        self.config.min_aspect_ratio = min_aspect;
        self.config.max_aspect_ratio = max_aspect;
        self.contours.set_aspect_bounds(min_aspect, max_aspect);
    }

    pub fn set_simplify_epsilon(&mut self, epsilon: f64) {
        self.config.simplify_epsilon = epsilon;
        self.contours.set_simplify_epsilon(epsilon);
    }
}

impl Default for WallMaskPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn square(size: usize, x0: usize, y0: usize, side: usize) -> RawMask {
        let mut values = vec![0.0; size * size];
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                values[y * size + x] = 1.0;
            }
        }
        RawMask::from_vec(size as u32, size as u32, values).unwrap()
    }

    #[test]
    fn test_missing_input_publishes_nothing() {
        let mut pipeline = WallMaskPipeline::default();
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        pipeline.subscribe(move |_: &ProcessedFrame<'_>| *counter.lock().unwrap() += 1);

        let err = pipeline.process(None::<&RawMask>).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput));
        assert_eq!(*seen.lock().unwrap(), 0);
        assert_eq!(pipeline.frames_processed(), 0);
    }

    #[test]
    fn test_empty_mask_rejected() {
        let mut pipeline = WallMaskPipeline::default();
        let empty = RawMask::from_vec(0, 5, Vec::new()).unwrap();

        let err = pipeline.process(&empty).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyMask { width: 0, height: 5 }));
        assert!(pipeline.dimensions().is_none());
    }

    #[test]
    fn test_all_consumers_see_same_frame() {
        let mut pipeline = WallMaskPipeline::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let seen = Arc::clone(&seen);
            pipeline.subscribe(move |frame: &ProcessedFrame<'_>| {
                seen.lock()
                    .unwrap()
                    .push((tag, frame.index, frame.wall_pixels()));
            });
        }

        let expected = pipeline.process(&square(64, 20, 20, 20)).unwrap().wall_pixels();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|&(_, index, pixels)| index == 0 && pixels == expected));
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut pipeline = WallMaskPipeline::default();
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let id = pipeline.subscribe(move |_: &ProcessedFrame<'_>| *counter.lock().unwrap() += 1);

        let mask = square(32, 8, 8, 16);
        pipeline.process(&mask).unwrap();
        assert!(pipeline.unsubscribe(id));
        assert!(!pipeline.unsubscribe(id));
        pipeline.process(&mask).unwrap();

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_second_frame_is_blended() {
        let mut pipeline = WallMaskPipeline::default();
        let mask = square(32, 8, 8, 16);

        assert!(pipeline.process(&mask).unwrap().temporal_reset);
        assert!(!pipeline.process(&mask).unwrap().temporal_reset);

        pipeline.reset_temporal_state();
        assert!(pipeline.process(&mask).unwrap().temporal_reset);
    }

    #[test]
    fn test_default_blend_bridges_one_dropout() {
        let mut pipeline = WallMaskPipeline::default();
        let wall = square(32, 8, 8, 16);
        let gone = square(32, 0, 0, 0);

        assert_eq!(pipeline.process(&wall).unwrap().regions.len(), 1);
        // 0.6 * 255 = 153 stays above the 128 cut
        let dropout = pipeline.process(&gone).unwrap();
        assert_eq!(dropout.regions.len(), 1);
        assert!(dropout.wall_pixels() > 0);
        // 0.6 * 153 = 92 falls below it
        assert_eq!(pipeline.process(&gone).unwrap().wall_pixels(), 0);
    }

    #[test]
    fn test_reenabling_smoothing_starts_fresh() {
        let mut pipeline = WallMaskPipeline::default();
        let wall = square(32, 8, 8, 16);
        let gone = square(32, 0, 0, 0);

        pipeline.process(&wall).unwrap();
        pipeline.set_temporal_enabled(false);
        assert!(!pipeline.process(&wall).unwrap().temporal_reset);

        pipeline.set_temporal_enabled(true);
        let frame = pipeline.process(&gone).unwrap();
        assert!(frame.temporal_reset);
        assert_eq!(frame.wall_pixels(), 0);
    }

    #[test]
    fn test_threshold_moves_scene_cut_level() {
        let solid = RawMask::from_vec(8, 8, vec![1.0; 64]).unwrap();
        let mut partial = vec![1.0; 64];
        partial[..24].fill(0.0);
        let partial = RawMask::from_vec(8, 8, partial).unwrap();

        let cut_after_partial = |threshold: f32| {
            let mut pipeline = WallMaskPipeline::new(PipelineConfig {
                kernel_size: 0,
                min_contour_area: 0.0,
                ..PipelineConfig::default()
            });
            pipeline.set_binary_threshold(threshold);
            pipeline.process(&solid).unwrap();
            // top three rows blend down to 153
            pipeline.process(&partial).unwrap();
            pipeline.set_scene_cut_fraction(Some(0.25));
            pipeline.process(&solid).unwrap().temporal_reset
        };

        assert!(!cut_after_partial(0.5));
        assert!(cut_after_partial(0.75));
    }

    #[test]
    fn test_dispose_then_reuse() {
        let mut pipeline = WallMaskPipeline::new(PipelineConfig {
            workers: 2,
            ..PipelineConfig::default()
        });
        pipeline.subscribe(|_: &ProcessedFrame<'_>| {});
        let mask = square(32, 8, 8, 16);
        let before = pipeline.process(&mask).unwrap().mask.clone();

        pipeline.dispose();
        assert!(pipeline.dimensions().is_none());
        assert_eq!(pipeline.consumer_count(), 0);

        let frame = pipeline.process(&mask).unwrap();
        assert!(frame.temporal_reset);
        assert_eq!(frame.mask, &before);
    }

    #[test]
    fn test_degraded_kernel_still_publishes() {
        let mut pipeline = WallMaskPipeline::default();
        pipeline.set_kernel_size(0);
        pipeline.set_min_contour_area(10.0);

        let frame = pipeline.process(&square(32, 8, 8, 16)).unwrap();
        // passthrough morphology keeps the square at its original size
        assert_eq!(frame.wall_pixels(), 256);
    }

    #[test]
    fn test_setters_update_config() {
        let mut pipeline = WallMaskPipeline::default();
        pipeline.set_blend_factor(3.0);
        pipeline.set_aspect_bounds(0.1, 10.0);
        pipeline.set_erode_iterations(2);

        let config = pipeline.config();
        assert_eq!(config.blend_factor, 1.0);
        assert_eq!(config.min_aspect_ratio, 0.1);
        assert_eq!(config.max_aspect_ratio, 10.0);
        assert_eq!(config.erode_iterations, 2);
        assert_eq!(config.dilate_iterations, 2);
    }
}
