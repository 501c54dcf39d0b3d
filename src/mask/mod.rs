pub mod convert;
mod raw;

pub use raw::RawMask;

/// Intensity of a foreground pixel in a binary mask
pub const FOREGROUND: u8 = 255;

/// Intensity of a background pixel in a binary mask
pub const BACKGROUND: u8 = 0;
