use crate::mask::BACKGROUND;
use image::GrayImage;
use rayon::prelude::*;
use rayon::ThreadPool;

use super::config::clamp_blend;

/// Exponential blend of each frame with the previous smoothed frame.
///
/// History lives in two fixed buffers; `front` indexes the one holding the
/// last output. The first frame after construction, `resize` or `reset` is
/// passed through and seeds the history.
#[derive(Debug)]
pub struct TemporalSmoother {
    enabled: bool,
    blend: f32,
    scene_cut_fraction: Option<f32>,
    // Level at which the scene-cut check counts a pixel as foreground
    foreground_level: u8,
    history: [GrayImage; 2],
    front: usize,
    primed: bool,
}

/// What the smoother did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    Disabled,
    /// First frame since a reset, passed through
    Seeded,
    Blended,
}

impl TemporalSmoother {
    pub fn new(
        enabled: bool,
        blend: f32,
        scene_cut_fraction: Option<f32>,
        foreground_level: u8,
    ) -> Self {
        Self {
            enabled,
            blend: clamp_blend(blend),
            scene_cut_fraction,
            foreground_level,
            history: [GrayImage::new(0, 0), GrayImage::new(0, 0)],
            front: 0,
            primed: false,
        }
    }

    /// Re-enabling forgets history, so the next frame seeds it afresh
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.reset();
        }
        self.enabled = enabled;
    }

    pub fn set_foreground_level(&mut self, level: u8) {
        self.foreground_level = level;
    }

    pub fn set_blend_factor(&mut self, blend: f32) {
        self.blend = clamp_blend(blend);
    }

    pub fn blend_factor(&self) -> f32 {
        self.blend
    }

    pub fn set_scene_cut_fraction(&mut self, fraction: Option<f32>) {
        self.scene_cut_fraction = fraction;
    }

    /// Reallocate history for new dimensions and re-arm first-frame passthrough
    pub fn resize(&mut self, width: u32, height: u32) {
        self.history = [GrayImage::new(width, height), GrayImage::new(width, height)];
        self.front = 0;
        self.primed = false;
    }

    /// Forget the previous frame
    pub fn reset(&mut self) {
        for buffer in self.history.iter_mut() {
            buffer.fill(BACKGROUND);
        }
        self.primed = false;
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Last smoothed frame, if one has been produced since the last reset
    pub fn previous(&self) -> Option<&GrayImage> {
        self.primed.then(|| &self.history[self.front])
    }

    /// Smooth `current` against history.
    ///
    /// Returns the smoothed frame (which is `current` itself when disabled)
    /// and what was done. `current` must match the dimensions given to the
    /// last `resize`.
    pub fn smooth<'a>(
        &'a mut self,
        current: &'a GrayImage,
        pool: Option<&ThreadPool>,
    ) -> (&'a GrayImage, Smoothing) {
        let _span = tracing::debug_span!("temporal").entered();

        if !self.enabled {
            return (current, Smoothing::Disabled);
        }

        debug_assert_eq!(current.dimensions(), self.history[0].dimensions());

        if self.primed {
            if let Some(fraction) = self.scene_cut_fraction {
                let changed = changed_fraction(
                    &self.history[self.front],
                    current,
                    self.foreground_level,
                );
                if changed > fraction {
                    tracing::debug!(
                        "Scene cut detected ({:.1}% of pixels changed), resetting history",
                        changed * 100.0
                    );
                    self.reset();
                }
            }
        }

        if !self.primed {
            self.history[self.front].copy_from_slice(current.as_raw());
            self.primed = true;
            return (&self.history[self.front], Smoothing::Seeded);
        }

        let back = 1 - self.front;
        let blend = self.blend;
        let (a, b) = self.history.split_at_mut(1);
        let (previous, output) = if self.front == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        };

        let mut pass = || blend_into(current.as_raw(), previous.as_raw(), output, blend);
        match pool {
            Some(pool) => pool.install(pass),
            None => pass(),
        }

        self.front = back;
        (&self.history[self.front], Smoothing::Blended)
    }
}

fn blend_into(current: &[u8], previous: &[u8], output: &mut [u8], blend: f32) {
    let keep = 1.0 - blend;
    output
        .par_iter_mut()
        .zip(current.par_iter().zip(previous.par_iter()))
        .for_each(|(out, (&cur, &prev))| {
            let value = blend * cur as f32 + keep * prev as f32;
            *out = value.round().clamp(0.0, 255.0) as u8;
        });
}

/// Fraction of pixels whose foreground state at `level` differs
fn changed_fraction(previous: &GrayImage, current: &GrayImage, level: u8) -> f32 {
    let total = current.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let changed = previous
        .as_raw()
        .par_iter()
        .zip(current.as_raw().par_iter())
        .filter(|&(&p, &c)| (p >= level) != (c >= level))
        .count();
    changed as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::FOREGROUND;
    use image::Luma;

    fn filled(value: u8) -> GrayImage {
        GrayImage::from_pixel(4, 4, Luma([value]))
    }

    fn smoother(blend: f32) -> TemporalSmoother {
        let mut s = TemporalSmoother::new(true, blend, None, 128);
        s.resize(4, 4);
        s
    }

    #[test]
    fn test_first_frame_passes_through() {
        let mut s = smoother(0.3);
        let frame = filled(FOREGROUND);

        let (out, mode) = s.smooth(&frame, None);
        assert_eq!(mode, Smoothing::Seeded);
        assert_eq!(out, &frame);
        assert!(s.is_primed());
    }

    #[test]
    fn test_blend_formula() {
        let mut s = smoother(0.25);
        s.smooth(&filled(FOREGROUND), None);

        let frame = filled(0);
        let (out, mode) = s.smooth(&frame, None);
        assert_eq!(mode, Smoothing::Blended);
        // 0.25 * 0 + 0.75 * 255 = 191.25
        assert_eq!(out.get_pixel(0, 0)[0], 191);
    }

    #[test]
    fn test_full_blend_returns_current() {
        let mut s = smoother(1.0);
        s.smooth(&filled(FOREGROUND), None);

        let frame = filled(37);
        let (out, _) = s.smooth(&frame, None);
        assert_eq!(out, &frame);
    }

    #[test]
    fn test_zero_blend_holds_previous() {
        let mut s = smoother(0.0);
        s.smooth(&filled(FOREGROUND), None);

        for _ in 0..5 {
            let frame = filled(0);
            let (out, _) = s.smooth(&frame, None);
            assert_eq!(out.get_pixel(2, 2)[0], FOREGROUND);
        }
    }

    #[test]
    fn test_blend_factor_is_clamped() {
        let mut s = smoother(2.0);
        assert_eq!(s.blend_factor(), 1.0);
        s.set_blend_factor(-1.0);
        assert_eq!(s.blend_factor(), 0.0);
    }

    #[test]
    fn test_reset_rearms_passthrough() {
        let mut s = smoother(0.5);
        s.smooth(&filled(FOREGROUND), None);
        s.reset();
        assert!(s.previous().is_none());

        let frame = filled(0);
        let (out, mode) = s.smooth(&frame, None);
        assert_eq!(mode, Smoothing::Seeded);
        assert_eq!(out, &frame);
    }

    #[test]
    fn test_disabled_leaves_history_untouched() {
        let mut s = smoother(0.5);
        s.smooth(&filled(FOREGROUND), None);
        s.set_enabled(false);

        let frame = filled(0);
        let (out, mode) = s.smooth(&frame, None);
        assert_eq!(mode, Smoothing::Disabled);
        assert_eq!(out, &frame);
        assert_eq!(s.previous(), Some(&filled(FOREGROUND)));
    }

    #[test]
    fn test_scene_cut_resets() {
        let mut s = TemporalSmoother::new(true, 0.1, Some(0.5), 128);
        s.resize(4, 4);
        s.smooth(&filled(FOREGROUND), None);

        let frame = filled(0);
        let (out, mode) = s.smooth(&frame, None);
        assert_eq!(mode, Smoothing::Seeded);
        assert_eq!(out, &frame);
    }

    #[test]
    fn test_scene_cut_uses_foreground_level() {
        // 150 is foreground at 128 but background at 200
        let mut low = TemporalSmoother::new(true, 0.5, Some(0.5), 128);
        low.resize(4, 4);
        low.smooth(&filled(150), None);
        assert_eq!(low.smooth(&filled(FOREGROUND), None).1, Smoothing::Blended);

        let mut high = TemporalSmoother::new(true, 0.5, Some(0.5), 200);
        high.resize(4, 4);
        high.smooth(&filled(150), None);
        assert_eq!(high.smooth(&filled(FOREGROUND), None).1, Smoothing::Seeded);

        high.set_foreground_level(100);
        assert_eq!(high.smooth(&filled(150), None).1, Smoothing::Blended);
    }

    #[test]
    fn test_reenable_forgets_stale_history() {
        let mut s = smoother(0.5);
        s.smooth(&filled(FOREGROUND), None);
        s.set_enabled(false);
        s.smooth(&filled(0), None);

        s.set_enabled(true);
        assert!(s.previous().is_none());
        let frame = filled(0);
        let (out, mode) = s.smooth(&frame, None);
        assert_eq!(mode, Smoothing::Seeded);
        assert_eq!(out, &frame);
    }

    #[test]
    fn test_enable_while_enabled_keeps_history() {
        let mut s = smoother(0.5);
        s.smooth(&filled(FOREGROUND), None);
        s.set_enabled(true);
        assert_eq!(s.smooth(&filled(0), None).1, Smoothing::Blended);
    }
}
