use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No raw mask was delivered for this cycle
    #[error("no raw mask supplied")]
    MissingInput,

    #[error("raw mask has no pixels ({width}x{height})")]
    EmptyMask { width: u32, height: u32 },

    #[error("raw mask length {len} does not match {width}x{height}")]
    LengthMismatch { width: u32, height: u32, len: usize },

    #[error("invalid structuring element size {size}")]
    InvalidKernel { size: usize },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
