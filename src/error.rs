// Every variant states *where* things went wrong.
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Creating the window failed.
    #[error("Window init error: {0}")]
    WindowInit(String),

    /// Updating the window buffer failed.
    #[error("Window update error: {0}")]
    WindowUpdate(String),

    /// Opening/starting the camera failed.
    #[error("Camera init error: {0}")]
    CameraInit(String),

    /// Grabbing/decoding a camera frame failed.
    #[error("Camera frame error: {0}")]
    CameraFrame(String),

    /// A video file, frame directory or image could not be opened as a source.
    #[error("Cannot open video source {}: {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    /// Decoding a frame from disk failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
