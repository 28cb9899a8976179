//! Finding trackable corners in a grayscale frame.
//!
//! [`ShiTomasi`] scores every pixel by the smaller eigenvalue of its local
//! structure tensor, keeps the well separated strong maxima and then moves each
//! one to its sub-pixel corner location.

use crate::types::TrackedPoint;
use crate::vision::{GrayF32, gray_to_f32, sample_bilinear, sobel_gradients};
use image::{GrayImage, Luma};

/// Finds salient points in a single frame.
pub trait FeatureDetector {
    /// Return up to `max_count` well distributed, sub-pixel refined points.
    fn detect(&self, gray: &GrayImage, max_count: usize) -> Vec<TrackedPoint>;

    /// Move `point` to the nearest corner inside a `(2 * half_win + 1)` square window.
    fn refine(&self, gray: &GrayImage, point: TrackedPoint, half_win: u32) -> TrackedPoint;
}

/// "Good features to track" with minimum-eigenvalue scoring.
#[derive(Debug, Clone)]
pub struct ShiTomasi {
    /// Fraction of the strongest response a corner must reach.
    pub quality: f32,
    /// Minimum euclidean distance between two returned corners.
    pub min_distance: f32,
    /// Side of the neighbourhood summed into the structure tensor.
    pub block_size: u32,
    /// Half size of the refinement window applied to detections.
    pub refine_half_win: u32,
    pub max_iter: usize,
    pub epsilon: f32,
}

impl Default for ShiTomasi {
    fn default() -> Self {
        Self {
            quality: 0.01,
            min_distance: 10.0,
            block_size: 3,
            refine_half_win: 10,
            max_iter: 20,
            epsilon: 0.03,
        }
    }
}

impl FeatureDetector for ShiTomasi {
    fn detect(&self, gray: &GrayImage, max_count: usize) -> Vec<TrackedPoint> {
        if max_count == 0 {
            return Vec::new();
        }
        let img = gray_to_f32(gray);
        let corners = self.strongest_corners(&img, max_count);
        corners
            .into_iter()
            .map(|p| refine_corner(&img, p, self.refine_half_win, self.max_iter, self.epsilon))
            .collect()
    }

    fn refine(&self, gray: &GrayImage, point: TrackedPoint, half_win: u32) -> TrackedPoint {
        let img = gray_to_f32(gray);
        refine_corner(&img, point, half_win, self.max_iter, self.epsilon)
    }
}

impl ShiTomasi {
    fn strongest_corners(&self, img: &GrayF32, max_count: usize) -> Vec<TrackedPoint> {
        let response = min_eigen_response(img, self.block_size);
        let max = response.pixels().map(|p| p.0[0]).fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }
        let threshold = max * self.quality;

        let (w, h) = response.dimensions();
        let mut candidates = Vec::new();
        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let v = response.get_pixel(x, y).0[0];
                if v > threshold && is_local_max(&response, x, y, v) {
                    candidates.push((v, x, y));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        // Bucket accepted corners so the distance check only looks at neighbours.
        let cell = self.min_distance.max(1.0);
        let grid_w = (w as f32 / cell).ceil() as usize + 1;
        let grid_h = (h as f32 / cell).ceil() as usize + 1;
        let mut grid: Vec<Vec<TrackedPoint>> = vec![Vec::new(); grid_w * grid_h];
        let min_d2 = self.min_distance * self.min_distance;

        let mut accepted = Vec::with_capacity(max_count.min(candidates.len()));
        for (_, x, y) in candidates {
            let p = TrackedPoint::new(x as f32, y as f32);
            let cx = (p.x / cell) as usize;
            let cy = (p.y / cell) as usize;
            let mut far_enough = true;
            'search: for gy in cy.saturating_sub(1)..=(cy + 1).min(grid_h - 1) {
                for gx in cx.saturating_sub(1)..=(cx + 1).min(grid_w - 1) {
                    for q in &grid[gy * grid_w + gx] {
                        let (dx, dy) = (q.x - p.x, q.y - p.y);
                        if dx * dx + dy * dy < min_d2 {
                            far_enough = false;
                            break 'search;
                        }
                    }
                }
            }
            if far_enough {
                grid[cy * grid_w + cx].push(p);
                accepted.push(p);
                if accepted.len() == max_count {
                    break;
                }
            }
        }
        accepted
    }
}

fn is_local_max(img: &GrayF32, x: u32, y: u32, v: f32) -> bool {
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if img.get_pixel(nx, ny).0[0] > v {
                return false;
            }
        }
    }
    true
}

/// Smaller eigenvalue of the gradient covariance summed over a `block` square.
fn min_eigen_response(img: &GrayF32, block: u32) -> GrayF32 {
    let (gx, gy) = sobel_gradients(img);
    let (w, h) = img.dimensions();
    let r = (block / 2) as i64;
    GrayF32::from_fn(w, h, |x, y| {
        let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
        for dy in -r..=r {
            for dx in -r..=r {
                let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                let ix = gx.get_pixel(sx, sy).0[0];
                let iy = gy.get_pixel(sx, sy).0[0];
                a += ix * ix;
                b += ix * iy;
                c += iy * iy;
            }
        }
        let lambda = ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt()) * 0.5;
        Luma([lambda.max(0.0)])
    })
}

/// Iteratively move `start` to the point where the image gradients around it
/// are orthogonal to the offsets from it. Falls back to `start` when the
/// estimate leaves the search window.
pub(crate) fn refine_corner(
    img: &GrayF32,
    start: TrackedPoint,
    half_win: u32,
    max_iter: usize,
    epsilon: f32,
) -> TrackedPoint {
    let (w, h) = img.dimensions();
    let win = half_win as i32;
    let coeff = 1.0 / (win.max(1) * win.max(1)) as f64;
    let weights: Vec<f64> = (-win..=win)
        .map(|i| (-((i * i) as f64) * coeff).exp())
        .collect();
    let eps2 = (epsilon * epsilon) as f64;

    let mut cur = start;
    for _ in 0..max_iter {
        let (mut a, mut b, mut c) = (0.0f64, 0.0f64, 0.0f64);
        let (mut bb1, mut bb2) = (0.0f64, 0.0f64);
        for (iy, dy) in (-win..=win).enumerate() {
            for (ix, dx) in (-win..=win).enumerate() {
                let px = cur.x + dx as f32;
                let py = cur.y + dy as f32;
                let gx = 0.5 * (sample_bilinear(img, px + 1.0, py) - sample_bilinear(img, px - 1.0, py)) as f64;
                let gy = 0.5 * (sample_bilinear(img, px, py + 1.0) - sample_bilinear(img, px, py - 1.0)) as f64;
                let m = weights[iy] * weights[ix];
                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * dx as f64 + gxy * dy as f64;
                bb2 += gxy * dx as f64 + gyy * dy as f64;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON {
            break;
        }
        let scale = 1.0 / det;
        let next = TrackedPoint::new(
            cur.x + (scale * (c * bb1 - b * bb2)) as f32,
            cur.y + (scale * (a * bb2 - b * bb1)) as f32,
        );
        let err = ((next.x - cur.x) as f64).powi(2) + ((next.y - cur.y) as f64).powi(2);
        cur = next;
        if cur.x < 0.0 || cur.x >= w as f32 || cur.y < 0.0 || cur.y >= h as f32 {
            break;
        }
        if err <= eps2 {
            break;
        }
    }

    if (cur.x - start.x).abs() > win as f32 || (cur.y - start.y).abs() > win as f32 {
        start
    } else {
        cur
    }
}
