// Opens a camera and converts its frames into buffers suitable for the window.
// A live camera has no frame count and cannot seek.

use crate::error::Error;
use crate::source::{FrameSource, SourceInfo, SourceKind};
use crate::types::FrameBuffer;
use log::debug;

use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
};

// A small wrapper around nokhwa::Camera so the player stays clean.
pub struct CameraCapture {
    cam: Camera,
    width: u32,
    height: u32,
    fps: f64,
    frames_read: usize,
}

impl CameraCapture {
    /// Try to open camera `index` at a target resolution (falls back if not exact).
    /// `fallback_fps` is reported when the device does not know its own rate.
    pub fn new(index: u32, width: u32, height: u32, fallback_fps: f64) -> Result<Self, Error> {
        let idx = CameraIndex::Index(index);

        let fmt = CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            30,                // target FPS
        );

        // Ask for RGB frames, prioritizing the format closest to our request.
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        let mut cam = Camera::new(idx, req)
            .map_err(|e| Error::CameraInit(format!("Create camera {index}: {e}")))?;

        cam.open_stream()
            .map_err(|e| Error::CameraInit(format!("Open stream: {e}")))?;

        // The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();
        let fps = match cam.frame_rate() {
            0 => fallback_fps,
            rate => rate as f64,
        };
        debug!("camera {index} streaming {}x{} at {fps} FPS", actual.width(), actual.height());

        Ok(Self {
            cam,
            width: actual.width(),
            height: actual.height(),
            fps,
            frames_read: 0,
        })
    }
}

impl FrameSource for CameraCapture {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: SourceKind::Camera,
            frame_count: 0,
            fps: self.fps,
            width: self.width as usize,
            height: self.height as usize,
        }
    }

    fn position(&self) -> usize {
        self.frames_read
    }

    // Nothing to seek in a live stream.
    fn set_position(&mut self, _position: usize) {}

    /// Grab one frame (blocks until the camera delivers it).
    fn read(&mut self) -> Result<Option<FrameBuffer>, Error> {
        let frame = self
            .cam
            .frame()
            .map_err(|e| Error::CameraFrame(format!("Fetch frame: {e}")))?;

        // Decode to an ImageBuffer<Rgb<u8>, Vec<u8>> (handles various raw formats safely).
        let rgb_img = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::CameraFrame(format!("Decode RGB: {e}")))?;

        // Pack as 0x00RRGGBB here rather than through FrameBuffer::from_rgb:
        // nokhwa may be built against a different `image` release than ours.
        let (w, h) = rgb_img.dimensions();
        let mut pixels = Vec::with_capacity((w as usize) * (h as usize));
        for pixel in rgb_img.pixels() {
            let r = pixel[0] as u32;
            let g = pixel[1] as u32;
            let b = pixel[2] as u32;
            pixels.push((r << 16) | (g << 8) | b);
        }

        self.frames_read += 1;
        Ok(Some(FrameBuffer { width: w as usize, height: h as usize, pixels }))
    }
}
