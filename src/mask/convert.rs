use image::{imageops, GrayImage, Rgb, RgbImage};

/// Resize a binary mask to another resolution
///
/// Nearest-neighbour sampling keeps the result binary. Used to bring a mask
/// at model resolution up to a camera frame.
pub fn resize_mask(mask: &GrayImage, target_width: u32, target_height: u32) -> GrayImage {
    let _span = tracing::debug_span!("resize_mask").entered();

    if mask.dimensions() == (target_width, target_height) {
        return mask.clone();
    }

    imageops::resize(
        mask,
        target_width,
        target_height,
        imageops::FilterType::Nearest,
    )
}

/// Tint the wall pixels of a background frame with a paint colour
///
/// # Arguments
/// * `background` - Frame to paint on
/// * `mask` - Wall mask at any resolution, resized to the background
/// * `paint` - Paint colour
/// * `opacity` - Paint opacity, clamped to [0, 1]
pub fn paint_overlay(
    background: &RgbImage,
    mask: &GrayImage,
    paint: Rgb<u8>,
    opacity: f32,
) -> RgbImage {
    let _span = tracing::debug_span!("paint_overlay").entered();

    let (width, height) = background.dimensions();
    let mask = resize_mask(mask, width, height);
    let opacity = opacity.clamp(0.0, 1.0);

    let mut painted = background.clone();
    for (x, y, pixel) in painted.enumerate_pixels_mut() {
        let coverage = mask.get_pixel(x, y)[0] as f32 / 255.0 * opacity;
        if coverage <= 0.0 {
            continue;
        }
        for c in 0..3 {
            let base = pixel[c] as f32;
            let tinted = base + (paint[c] as f32 - base) * coverage;
            pixel[c] = tinted.round().clamp(0.0, 255.0) as u8;
        }
    }

    painted
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_resize_mask_stays_binary() {
        let mut mask = GrayImage::new(4, 4);
        for y in 0..4 {
            for x in 0..2 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let resized = resize_mask(&mask, 16, 8);
        assert_eq!(resized.dimensions(), (16, 8));
        assert!(resized.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(resized.get_pixel(0, 0)[0], 255);
        assert_eq!(resized.get_pixel(15, 7)[0], 0);
    }

    #[test]
    fn test_paint_overlay() {
        let background = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([255]));

        let painted = paint_overlay(&background, &mask, Rgb([200, 100, 50]), 1.0);
        assert_eq!(painted.get_pixel(0, 0), &Rgb([200, 100, 50]));
        assert_eq!(painted.get_pixel(1, 0), &Rgb([0, 0, 0]));

        let half = paint_overlay(&background, &mask, Rgb([200, 100, 50]), 0.5);
        assert_eq!(half.get_pixel(0, 0), &Rgb([100, 50, 25]));
    }
}
