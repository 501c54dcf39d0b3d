mod sequence;

pub use sequence::MaskSequence;

use anyhow::Result;
use wallmask::RawMask;

/// A raw mask together with where it came from
pub struct SourceFrame {
    pub name: String,
    pub mask: RawMask,
}

/// Trait for raw mask producers
pub trait MaskSource {
    /// Next mask in production order, `None` once exhausted
    fn next_frame(&mut self) -> Result<Option<SourceFrame>>;

    /// Number of masks this source will produce, if known
    fn len_hint(&self) -> Option<usize> {
        None
    }
}
