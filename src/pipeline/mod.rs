mod config;
mod consumer;
pub mod contours;
pub mod geometry;
pub mod morphology;
pub mod temporal;
mod wall_mask;

pub use config::PipelineConfig;
pub use consumer::{MaskConsumer, ProcessedFrame, SubscriptionId};
pub use contours::{ContourStats, WallRegion};
pub use wall_mask::WallMaskPipeline;
