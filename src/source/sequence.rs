use super::{MaskSource, SourceFrame};
use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use wallmask::RawMask;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "tif", "tiff"];

/// Mask images read from disk in file-name order
///
/// Each image is converted to 8-bit grayscale and read as probabilities
/// (0 = background, 255 = certain wall).
pub struct MaskSequence {
    pending: VecDeque<PathBuf>,
    total: usize,
}

impl MaskSequence {
    /// Open a single image or every image in a directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut files = if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
            {
                let file = entry?.path();
                if is_image(&file) {
                    files.push(file);
                }
            }
            files
        } else {
            vec![path.to_path_buf()]
        };
        files.sort();

        if files.is_empty() {
            bail!("No mask images found in {}", path.display());
        }

        tracing::info!("Found {} mask image(s) in {}", files.len(), path.display());

        Ok(Self {
            total: files.len(),
            pending: files.into(),
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl MaskSource for MaskSequence {
    fn next_frame(&mut self) -> Result<Option<SourceFrame>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        let image = image::open(&path)
            .with_context(|| format!("Failed to decode mask {}", path.display()))?
            .to_luma8();

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("frame{}", self.total - self.pending.len()));

        Ok(Some(SourceFrame {
            name,
            mask: RawMask::from_gray(&image),
        }))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.total)
    }
}
