//! Sparse pyramidal Lucas-Kanade optical flow.
//!
//! Each point is tracked coarse to fine: the displacement found on a smaller
//! pyramid level seeds the search on the next finer one, and on every level a
//! few Gauss-Newton steps minimise the intensity difference over a square
//! window around the point.

use crate::types::TrackedPoint;
use crate::vision::{GrayF32, build_pyramid, gray_to_f32, sample_bilinear, scharr_gradients};
use image::GrayImage;

/// Estimated positions of the input points in the current frame.
///
/// `points[i]` is only meaningful when `status[i]` is true; both vectors are
/// index aligned with the input point set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowResult {
    pub points: Vec<TrackedPoint>,
    pub status: Vec<bool>,
}

/// Moves a point set from one frame into the next.
pub trait FlowEstimator {
    fn estimate(&self, prior: &GrayImage, current: &GrayImage, points: &[TrackedPoint]) -> FlowResult;
}

/// Parameters of the tracker, defaults as used by the player.
#[derive(Debug, Clone)]
pub struct PyramidalLk {
    /// Side of the square integration window, odd.
    pub win_size: u32,
    /// Number of pyramid levels above the full resolution frame.
    pub max_level: usize,
    pub max_iter: usize,
    /// Stop iterating once a step is shorter than this (pixels).
    pub epsilon: f32,
    /// Minimum eigenvalue of the window's gradient matrix divided by its area,
    /// measured in [`EIGEN_SCALE`] units.
    pub min_eigen_threshold: f32,
}

impl Default for PyramidalLk {
    fn default() -> Self {
        Self {
            win_size: 31,
            max_level: 3,
            max_iter: 20,
            epsilon: 0.03,
            min_eigen_threshold: 0.001,
        }
    }
}

/// Gradient products in 8-bit Scharr units (32x the per-pixel derivative)
/// times 2^-20, the scale the eigenvalue threshold is quoted in.
pub const EIGEN_SCALE: f32 = 32.0 * 32.0 / (1u32 << 20) as f32;

struct Level {
    prev: GrayF32,
    next: GrayF32,
    grad_x: GrayF32,
    grad_y: GrayF32,
}

impl FlowEstimator for PyramidalLk {
    fn estimate(&self, prior: &GrayImage, current: &GrayImage, points: &[TrackedPoint]) -> FlowResult {
        if points.is_empty() {
            return FlowResult::default();
        }

        let prev_pyr = build_pyramid(&gray_to_f32(prior), self.max_level, self.win_size);
        let next_pyr = build_pyramid(&gray_to_f32(current), self.max_level, self.win_size);
        let levels: Vec<Level> = prev_pyr
            .into_iter()
            .zip(next_pyr)
            .map(|(prev, next)| {
                let (grad_x, grad_y) = scharr_gradients(&prev);
                Level { prev, next, grad_x, grad_y }
            })
            .collect();

        let mut result = FlowResult {
            points: Vec::with_capacity(points.len()),
            status: Vec::with_capacity(points.len()),
        };
        for &pt in points {
            let (next, ok) = self.track_point(&levels, pt);
            result.points.push(next);
            result.status.push(ok);
        }
        result
    }
}

impl PyramidalLk {
    fn track_point(&self, levels: &[Level], pt: TrackedPoint) -> (TrackedPoint, bool) {
        let half = (self.win_size / 2) as i32;
        let side = (2 * half + 1) as usize;
        let area = (side * side) as f32;
        let eps2 = self.epsilon * self.epsilon;

        let mut patch_i = vec![0.0f32; side * side];
        let mut patch_x = vec![0.0f32; side * side];
        let mut patch_y = vec![0.0f32; side * side];

        let top = levels.len() - 1;
        let mut next = TrackedPoint::default();
        let mut ok = true;

        for (lvl, level) in levels.iter().enumerate().rev() {
            let scale = 1.0 / (1u32 << lvl) as f32;
            let prev_pt = TrackedPoint::new(pt.x * scale, pt.y * scale);
            next = if lvl == top {
                prev_pt
            } else {
                TrackedPoint::new(next.x * 2.0, next.y * 2.0)
            };

            let (w, h) = level.prev.dimensions();
            if !window_on_image(prev_pt, half, w, h) {
                if lvl == 0 {
                    ok = false;
                }
                continue;
            }

            // The prior frame's window does not move while iterating.
            let (mut a11, mut a12, mut a22) = (0.0f32, 0.0f32, 0.0f32);
            let mut k = 0;
            for dy in -half..=half {
                for dx in -half..=half {
                    let x = prev_pt.x + dx as f32;
                    let y = prev_pt.y + dy as f32;
                    let ix = sample_bilinear(&level.grad_x, x, y);
                    let iy = sample_bilinear(&level.grad_y, x, y);
                    patch_i[k] = sample_bilinear(&level.prev, x, y);
                    patch_x[k] = ix;
                    patch_y[k] = iy;
                    a11 += ix * ix;
                    a12 += ix * iy;
                    a22 += iy * iy;
                    k += 1;
                }
            }

            let det = a11 * a22 - a12 * a12;
            let min_eig = (a22 + a11 - ((a11 - a22) * (a11 - a22) + 4.0 * a12 * a12).sqrt()) * EIGEN_SCALE
                / (2.0 * area);
            if min_eig < self.min_eigen_threshold || det < f32::EPSILON {
                if lvl == 0 {
                    ok = false;
                }
                continue;
            }
            let inv_det = 1.0 / det;

            let mut prev_delta = (0.0f32, 0.0f32);
            for iter in 0..self.max_iter {
                if !window_on_image(next, half, w, h) {
                    if lvl == 0 {
                        ok = false;
                    }
                    break;
                }

                let (mut b1, mut b2) = (0.0f32, 0.0f32);
                let mut k = 0;
                for dy in -half..=half {
                    for dx in -half..=half {
                        let j = sample_bilinear(&level.next, next.x + dx as f32, next.y + dy as f32);
                        let diff = j - patch_i[k];
                        b1 += diff * patch_x[k];
                        b2 += diff * patch_y[k];
                        k += 1;
                    }
                }

                let delta = ((a12 * b2 - a22 * b1) * inv_det, (a12 * b1 - a11 * b2) * inv_det);
                next.x += delta.0;
                next.y += delta.1;

                if delta.0 * delta.0 + delta.1 * delta.1 <= eps2 {
                    break;
                }
                // Bouncing between two positions: settle in the middle.
                if iter > 0 && (delta.0 + prev_delta.0).abs() < 0.01 && (delta.1 + prev_delta.1).abs() < 0.01 {
                    next.x -= delta.0 * 0.5;
                    next.y -= delta.1 * 0.5;
                    break;
                }
                prev_delta = delta;
            }
        }

        (next, ok)
    }
}

/// The window's top-left corner may hang off the image by at most one window.
fn window_on_image(p: TrackedPoint, half: i32, w: u32, h: u32) -> bool {
    let side = 2 * half + 1;
    let x0 = (p.x - half as f32).floor();
    let y0 = (p.y - half as f32).floor();
    x0.is_finite()
        && y0.is_finite()
        && x0 >= -(side as f32)
        && y0 >= -(side as f32)
        && x0 < w as f32
        && y0 < h as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob(size: u32, cx: f32, cy: f32, sigma: f32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let v = 20.0 + 200.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            Luma([v.round() as u8])
        })
    }

    #[test]
    fn empty_point_set_does_no_work() {
        let img = blob(64, 32.0, 32.0, 6.0);
        let result = PyramidalLk::default().estimate(&img, &img, &[]);
        assert!(result.points.is_empty());
        assert!(result.status.is_empty());
    }

    #[test]
    fn identical_frames_give_zero_motion() {
        let img = blob(96, 48.0, 48.0, 6.0);
        let pts = [TrackedPoint::new(48.0, 48.0), TrackedPoint::new(52.0, 45.0)];
        let result = PyramidalLk::default().estimate(&img, &img, &pts);
        assert_eq!(result.status, vec![true, true]);
        for (p, q) in pts.iter().zip(&result.points) {
            assert!(p.distance(q) < 0.05, "{p:?} moved to {q:?}");
        }
    }

    #[test]
    fn follows_a_translated_blob() {
        let (dx, dy) = (3.0, -2.0);
        let prev = blob(96, 48.0, 48.0, 6.0);
        let next = blob(96, 48.0 + dx, 48.0 + dy, 6.0);
        let pts = [TrackedPoint::new(48.0, 48.0), TrackedPoint::new(51.0, 50.0)];
        let result = PyramidalLk::default().estimate(&prev, &next, &pts);
        for (i, p) in pts.iter().enumerate() {
            assert!(result.status[i]);
            let expected = TrackedPoint::new(p.x + dx, p.y + dy);
            assert!(result.points[i].distance(&expected) < 0.1, "{:?}", result.points[i]);
        }
    }

    #[test]
    fn pyramid_recovers_large_motion() {
        let (dx, dy) = (8.0, -6.0);
        let prev = blob(160, 80.0, 80.0, 8.0);
        let next = blob(160, 80.0 + dx, 80.0 + dy, 8.0);
        let pts = [TrackedPoint::new(80.0, 80.0)];
        let result = PyramidalLk::default().estimate(&prev, &next, &pts);
        assert!(result.status[0]);
        assert!(result.points[0].distance(&TrackedPoint::new(88.0, 74.0)) < 0.25, "{:?}", result.points[0]);
    }

    #[test]
    fn flat_frames_lose_every_point() {
        let img = GrayImage::from_pixel(64, 64, Luma([100]));
        let pts = [TrackedPoint::new(16.0, 16.0), TrackedPoint::new(40.0, 20.0)];
        let result = PyramidalLk::default().estimate(&img, &img, &pts);
        assert_eq!(result.status, vec![false, false]);
    }

    #[test]
    fn faint_texture_is_not_trusted() {
        // one grey level of contrast in 4 px cells
        let img = GrayImage::from_fn(96, 96, |x, y| Luma([if ((x / 4) + (y / 4)) % 2 == 0 { 100 } else { 101 }]));
        let result = PyramidalLk::default().estimate(&img, &img, &[TrackedPoint::new(48.0, 48.0)]);
        assert_eq!(result.status, vec![false]);

        let strong = GrayImage::from_fn(96, 96, |x, y| Luma([if ((x / 4) + (y / 4)) % 2 == 0 { 60 } else { 180 }]));
        let result = PyramidalLk::default().estimate(&strong, &strong, &[TrackedPoint::new(48.0, 48.0)]);
        assert_eq!(result.status, vec![true]);
    }

    #[test]
    fn points_far_outside_the_frame_are_lost() {
        let img = blob(64, 32.0, 32.0, 6.0);
        let pts = [TrackedPoint::new(-200.0, 10.0)];
        let result = PyramidalLk::default().estimate(&img, &img, &pts);
        assert_eq!(result.status, vec![false]);
    }
}
