use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera backend could be opened and configured (tried {tried:?})")]
    Unavailable { tried: Vec<String> },
    #[error("failed to open camera with backend {backend}: {reason}")]
    Open { backend: String, reason: String },
    #[error("failed to configure camera with backend {backend}: {reason}")]
    Configure { backend: String, reason: String },
    #[error("camera read failed: {0}")]
    ReadFailed(String),
    #[error("camera closed")]
    Closed,
    #[error("OpenCV error {0:?}")]
    OpenCv(#[from] opencv::Error),
}

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("overlay needs 8 bit BGR images, got frame type {frame} and sprite type {sprite}")]
    UnsupportedFrame { frame: i32, sprite: i32 },
    #[error("OpenCV error {0:?}")]
    OpenCv(#[from] opencv::Error),
}
