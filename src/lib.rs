//! Post-processing for wall segmentation masks.
//!
//! A raw per-pixel wall probability grid goes through threshold, erosion and
//! dilation, temporal smoothing and contour filtering, and comes out as a
//! binary mask of wall-shaped regions. See [`WallMaskPipeline`].

pub mod error;
pub mod mask;
pub mod pipeline;

pub use error::PipelineError;
pub use mask::RawMask;
pub use pipeline::{
    MaskConsumer, PipelineConfig, ProcessedFrame, SubscriptionId, WallMaskPipeline, WallRegion,
};
