// Core types shared by the tracker, the player and the window.

use image::RgbImage;

/// A color frame as the window wants it.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    pub width: usize,      // how wide the frame is on screen (pixels)
    pub height: usize,     // how tall the frame is on screen (pixels)
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// An all-black frame.
    pub fn black(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0u32; width * height] }
    }

    /// Pack a decoded RGB image as 0x00RRGGBB pixels.
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let (w, h) = rgb.dimensions();
        let mut pixels = Vec::with_capacity((w as usize) * (h as usize));
        for pixel in rgb.pixels() {
            let r = pixel[0] as u32;
            let g = pixel[1] as u32;
            let b = pixel[2] as u32;
            pixels.push((r << 16) | (g << 8) | b);
        }
        Self { width: w as usize, height: h as usize, pixels }
    }
}

/// A 2D sub-pixel image coordinate being followed from frame to frame.
///
/// Points have no identity of their own: index `i` of the prior set maps to
/// index `i` of the flowed-forward set for a single frame step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackedPoint {
    pub x: f32,
    pub y: f32,
}

impl TrackedPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &TrackedPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// The single pending user request consumed by the next frame.
///
/// A newer request overwrites an unconsumed one; nothing is queued.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Mode {
    #[default]
    None,
    /// Add a point near the clicked pixel.
    AddPoint(TrackedPoint),
    /// Forget every tracked point.
    Clear,
    /// Replace the tracked points with freshly detected features.
    Redetect,
}

/// Whether the player advances on its own or waits for a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Running,
    Stepping,
}

/// Everything the user can ask of the player between two frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    Quit,
    Redetect,
    Clear,
    ToggleNight,
    Run,
    Step,
    AddPoint(TrackedPoint),
    Seek(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_packs_channels() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, image::Rgb([0x12, 0x34, 0x56]));
        rgb.put_pixel(1, 0, image::Rgb([0xff, 0x00, 0x01]));
        let fb = FrameBuffer::from_rgb(&rgb);
        assert_eq!((fb.width, fb.height), (2, 1));
        assert_eq!(fb.pixels, vec![0x00_12_34_56, 0x00_ff_00_01]);
    }

    #[test]
    fn default_mode_is_none() {
        assert_eq!(Mode::default(), Mode::None);
    }
}
