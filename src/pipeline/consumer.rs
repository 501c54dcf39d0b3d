use image::GrayImage;

use super::contours::WallRegion;

/// Result of one pipeline pass, handed to consumers and returned to the caller.
///
/// Borrows the pipeline's output buffers: the mask is overwritten in place by
/// the next `process` call, so copy it if it must outlive this frame.
#[derive(Debug, Clone, Copy)]
pub struct ProcessedFrame<'a> {
    /// Number of frames processed before this one
    pub index: u64,
    pub mask: &'a GrayImage,
    pub regions: &'a [WallRegion],
    /// Candidate regions dropped by the shape filter
    pub rejected: usize,
    /// Temporal history was empty, so this frame was not blended
    pub temporal_reset: bool,
}

impl ProcessedFrame<'_> {
    /// Returns (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn wall_pixels(&self) -> usize {
        self.mask.pixels().filter(|p| p[0] != 0).count()
    }
}

/// Receives every published frame, synchronously, on the processing thread
pub trait MaskConsumer {
    fn on_mask_ready(&mut self, frame: &ProcessedFrame<'_>);
}

impl<F> MaskConsumer for F
where
    F: FnMut(&ProcessedFrame<'_>),
{
    fn on_mask_ready(&mut self, frame: &ProcessedFrame<'_>) {
        self(frame)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);
