mod png;

pub use png::{Overlay, PngSink};

use anyhow::Result;
use wallmask::ProcessedFrame;

/// Trait for processed mask destinations
pub trait MaskSink {
    /// Write one processed frame under `name`
    fn write_frame(&mut self, name: &str, frame: &ProcessedFrame<'_>) -> Result<()>;
}
