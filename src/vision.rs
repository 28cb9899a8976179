// Grayscale conversion and the float-image helpers shared by the feature
// detector and the optical-flow estimator.

use crate::types::FrameBuffer;
use image::{GrayImage, ImageBuffer, Luma};

/// Single channel float image, intensities in 0..=255.
pub type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Convert a 0x00RRGGBB frame to 8-bit luma (0.299 R + 0.587 G + 0.114 B).
pub fn to_gray(frame: &FrameBuffer) -> GrayImage {
    // Fixed point weights scaled by 2^14, rounded.
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    let mut out = Vec::with_capacity(frame.pixels.len());
    for &px in &frame.pixels {
        let r = (px >> 16) & 0xFF;
        let g = (px >> 8) & 0xFF;
        let b = px & 0xFF;
        out.push(((r * R + g * G + b * B + (1 << 13)) >> 14) as u8);
    }
    GrayImage::from_raw(frame.width as u32, frame.height as u32, out)
        .unwrap_or_else(|| GrayImage::new(frame.width as u32, frame.height as u32))
}

pub fn gray_to_f32(gray: &GrayImage) -> GrayF32 {
    let (w, h) = gray.dimensions();
    GrayF32::from_fn(w, h, |x, y| Luma([gray.get_pixel(x, y).0[0] as f32]))
}

/// Pixel lookup with replicated borders.
#[inline]
pub fn at_clamped(img: &GrayF32, x: i64, y: i64) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0, w as i64 - 1) as u32;
    let y = y.clamp(0, h as i64 - 1) as u32;
    img.get_pixel(x, y).0[0]
}

/// Bilinear sample at a sub-pixel location, clamping to the image border.
#[inline]
pub fn sample_bilinear(img: &GrayF32, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0).0[0];
    let p10 = img.get_pixel(x1, y0).0[0];
    let p01 = img.get_pixel(x0, y1).0[0];
    let p11 = img.get_pixel(x1, y1).0[0];

    let top = p00 + (p10 - p00) * fx;
    let bottom = p01 + (p11 - p01) * fx;
    top + (bottom - top) * fy
}

/// Blur with the 5-tap binomial kernel and drop every other row and column.
pub fn pyr_down(img: &GrayF32) -> GrayF32 {
    const K: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    let (w, h) = img.dimensions();
    let (ow, oh) = (w.div_ceil(2), h.div_ceil(2));
    GrayF32::from_fn(ow, oh, |ox, oy| {
        let cx = 2 * ox as i64;
        let cy = 2 * oy as i64;
        let mut acc = 0.0f32;
        for (ky, wy) in K.iter().enumerate() {
            let mut row = 0.0f32;
            for (kx, wx) in K.iter().enumerate() {
                row += wx * at_clamped(img, cx + kx as i64 - 2, cy + ky as i64 - 2);
            }
            acc += wy * row;
        }
        Luma([acc / 256.0])
    })
}

/// Build a Gaussian pyramid with at most `max_level` extra levels. A level is
/// only added while both of its sides stay larger than `min_side`.
pub fn build_pyramid(img: &GrayF32, max_level: usize, min_side: u32) -> Vec<GrayF32> {
    let mut levels = vec![img.clone()];
    while levels.len() <= max_level {
        let (w, h) = match levels.last() {
            Some(last) => last.dimensions(),
            None => break,
        };
        if w.div_ceil(2) <= min_side || h.div_ceil(2) <= min_side {
            break;
        }
        let next = pyr_down(&levels[levels.len() - 1]);
        levels.push(next);
    }
    levels
}

/// Horizontal and vertical derivatives with a 3x3 kernel whose smoothing taps
/// are `[edge, center, edge]`, normalised to intensity units per pixel.
fn derivatives(img: &GrayF32, edge: f32, center: f32) -> (GrayF32, GrayF32) {
    let (w, h) = img.dimensions();
    let norm = 2.0 * (2.0 * edge + center);
    let gx = GrayF32::from_fn(w, h, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let d = edge * (at_clamped(img, x + 1, y - 1) - at_clamped(img, x - 1, y - 1))
            + center * (at_clamped(img, x + 1, y) - at_clamped(img, x - 1, y))
            + edge * (at_clamped(img, x + 1, y + 1) - at_clamped(img, x - 1, y + 1));
        Luma([d / norm])
    });
    let gy = GrayF32::from_fn(w, h, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let d = edge * (at_clamped(img, x - 1, y + 1) - at_clamped(img, x - 1, y - 1))
            + center * (at_clamped(img, x, y + 1) - at_clamped(img, x, y - 1))
            + edge * (at_clamped(img, x + 1, y + 1) - at_clamped(img, x + 1, y - 1));
        Luma([d / norm])
    });
    (gx, gy)
}

/// Scharr derivatives, used by the flow estimator.
pub fn scharr_gradients(img: &GrayF32) -> (GrayF32, GrayF32) {
    derivatives(img, 3.0, 10.0)
}

/// Sobel derivatives, used by the corner response.
pub fn sobel_gradients(img: &GrayF32) -> (GrayF32, GrayF32) {
    derivatives(img, 1.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gray_uses_luma_weights() {
        let frame = FrameBuffer {
            width: 3,
            height: 1,
            pixels: vec![0x00_FF_FF_FF, 0x00_00_FF_00, 0x00_00_00_00],
        };
        let gray = to_gray(&frame);
        assert_eq!(gray.dimensions(), (3, 1));
        assert_eq!(gray.as_raw(), &vec![255u8, 150, 0]);
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = GrayF32::from_fn(2, 2, |x, y| Luma([(x * 10 + y * 20) as f32]));
        assert_abs_diff_eq!(sample_bilinear(&img, 0.5, 0.0), 5.0, epsilon = 1e-5);
        assert_abs_diff_eq!(sample_bilinear(&img, 0.5, 0.5), 15.0, epsilon = 1e-5);
        // outside the image clamps to the border
        assert_abs_diff_eq!(sample_bilinear(&img, -3.0, 9.0), 20.0, epsilon = 1e-5);
    }

    #[test]
    fn pyr_down_halves_and_keeps_flat_images_flat() {
        let img = GrayF32::from_pixel(5, 3, Luma([42.0]));
        let down = pyr_down(&img);
        assert_eq!(down.dimensions(), (3, 2));
        for p in down.pixels() {
            assert_abs_diff_eq!(p.0[0], 42.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn pyramid_stops_before_window_size() {
        let img = GrayF32::new(128, 96);
        let levels = build_pyramid(&img, 3, 31);
        let dims: Vec<_> = levels.iter().map(|l| l.dimensions()).collect();
        assert_eq!(dims, vec![(128, 96), (64, 48)]);
    }

    #[test]
    fn gradients_of_a_ramp() {
        let img = GrayF32::from_fn(8, 8, |x, _| Luma([3.0 * x as f32]));
        let (gx, gy) = scharr_gradients(&img);
        assert_abs_diff_eq!(gx.get_pixel(4, 4).0[0], 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(gy.get_pixel(4, 4).0[0], 0.0, epsilon = 1e-5);
        let (sx, _) = sobel_gradients(&img);
        assert_abs_diff_eq!(sx.get_pixel(4, 4).0[0], 3.0, epsilon = 1e-5);
    }
}
