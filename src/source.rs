//! Where frames come from: a live camera or a seekable file.

use crate::camera::CameraCapture;
use crate::error::Error;
use crate::types::FrameBuffer;
use crate::video::FrameSequence;
use std::fmt::{self, Display};
use std::path::PathBuf;
use std::time::Duration;

/// Token on the command line that selects the default camera.
pub const CAMERA_TOKEN: &str = "-";

/// Rate assumed when a source cannot report one.
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Gif,
    Image,
    Sequence,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Camera => "camera",
            SourceKind::Gif => "GIF",
            SourceKind::Image => "still image",
            SourceKind::Sequence => "image sequence",
        };
        f.write_str(s)
    }
}

/// A snapshot of what a source reports about itself.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub kind: SourceKind,
    /// Number of frames, 0 when unknown (live camera).
    pub frame_count: usize,
    pub fps: f64,
    pub width: usize,
    pub height: usize,
}

impl SourceInfo {
    /// Live sources can not be stepped or scrubbed.
    pub fn is_live(&self) -> bool {
        self.frame_count == 0
    }

    /// Time between frames when running at speed.
    pub fn frame_delay(&self) -> Duration {
        let fps = if self.fps > 0.0 { self.fps } else { DEFAULT_FPS };
        Duration::from_millis(((1000.0 / fps) as u64).max(1))
    }
}

impl Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frame_count > 0 {
            write!(f, "{} ", self.frame_count)?;
        }
        write!(
            f,
            "({}x{}) frames of {} video at {} FPS",
            self.width, self.height, self.kind, self.fps
        )
    }
}

/// Sequential frames with a query side and a positioning side.
pub trait FrameSource {
    fn info(&self) -> SourceInfo;

    /// Index of the frame the next `read` returns.
    fn position(&self) -> usize;

    /// Seek so the next `read` returns frame `position` (clamped to the end).
    fn set_position(&mut self, position: usize);

    /// The next frame, or `None` once a finite source is exhausted.
    fn read(&mut self) -> Result<Option<FrameBuffer>, Error>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> SourceInfo {
        (**self).info()
    }

    fn position(&self) -> usize {
        (**self).position()
    }

    fn set_position(&mut self, position: usize) {
        (**self).set_position(position)
    }

    fn read(&mut self) -> Result<Option<FrameBuffer>, Error> {
        (**self).read()
    }
}

/// How to open whatever the command line names.
#[derive(Clone, Debug)]
pub struct SourceOptions {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    /// Used for files without an intrinsic rate and cameras reporting none.
    pub fallback_fps: f64,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self { camera_index: 0, width: 640, height: 480, fallback_fps: DEFAULT_FPS }
    }
}

/// What a command line token refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceArg {
    Camera,
    Path(PathBuf),
}

impl SourceArg {
    pub fn parse(token: &str) -> Self {
        if token == CAMERA_TOKEN {
            SourceArg::Camera
        } else {
            SourceArg::Path(PathBuf::from(token))
        }
    }

    /// Window title: the path as given, or the camera's number.
    pub fn title(&self, camera_index: u32) -> String {
        match self {
            SourceArg::Camera => format!("Camera {camera_index}"),
            SourceArg::Path(path) => path.display().to_string(),
        }
    }
}

/// Open the camera for `-`, otherwise a file or frame directory.
pub fn open_source(arg: &SourceArg, opts: &SourceOptions) -> Result<Box<dyn FrameSource>, Error> {
    match arg {
        SourceArg::Camera => {
            let cam = CameraCapture::new(opts.camera_index, opts.width, opts.height, opts.fallback_fps)?;
            Ok(Box::new(cam))
        }
        SourceArg::Path(path) => Ok(Box::new(FrameSequence::open(path, opts.fallback_fps)?)),
    }
}
