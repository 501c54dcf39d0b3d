use super::MaskSink;
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use wallmask::mask::convert::paint_overlay;
use wallmask::ProcessedFrame;

/// Paint preview settings
pub struct Overlay {
    pub background: RgbImage,
    pub paint: Rgb<u8>,
    pub opacity: f32,
}

/// Writes final masks as `<name>.png` into a directory
///
/// With an overlay configured, also writes `<name>_paint.png`: the
/// background frame with wall pixels tinted in the paint colour.
pub struct PngSink {
    dir: PathBuf,
    overlay: Option<Overlay>,
}

impl PngSink {
    pub fn new<P: AsRef<Path>>(dir: P, overlay: Option<Overlay>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        tracing::info!("Writing masks to {}", dir.display());

        Ok(Self { dir, overlay })
    }
}

impl MaskSink for PngSink {
    fn write_frame(&mut self, name: &str, frame: &ProcessedFrame<'_>) -> Result<()> {
        let path = self.dir.join(format!("{}.png", name));
        frame
            .mask
            .save(&path)
            .with_context(|| format!("Failed to write mask to {}", path.display()))?;

        if let Some(overlay) = &self.overlay {
            let painted = paint_overlay(
                &overlay.background,
                frame.mask,
                overlay.paint,
                overlay.opacity,
            );
            let path = self.dir.join(format!("{}_paint.png", name));
            painted
                .save(&path)
                .with_context(|| format!("Failed to write paint preview to {}", path.display()))?;
        }

        Ok(())
    }
}
