use std::path::PathBuf;
use std::time::Duration;

/// Side length of the character sprite in pixels.
pub const SPRITE_SIZE: i32 = 150;
pub const DEFAULT_SPRITE_PATH: &str = "static/images/character.jpg";
pub const DEFAULT_CASCADE: &str = "haarcascades/haarcascade_frontalface_default.xml";
pub const DEFAULT_PORT: u16 = 5000;

// detector tuning
pub const SCALE_FACTOR: f64 = 1.1;
pub const MIN_NEIGHBORS: i32 = 4;
pub const MIN_FACE_SIZE: i32 = 30;

// character blend weights, frame then sprite
pub const FRAME_WEIGHT: f64 = 0.7;
pub const SPRITE_WEIGHT: f64 = 0.3;

pub const CAPTION: &str = "Happy Birthday!";
pub const CAPTION_OFFSET: i32 = 50;
pub const CAPTION_SCALE: f64 = 1.0;
pub const CAPTION_THICKNESS: i32 = 2;

pub const OUTLINE_THICKNESS: i32 = 2;

pub const PARTICLE_INTERVAL: Duration = Duration::from_millis(100);
pub const PARTICLES_PER_BURST: usize = 5;
pub const PARTICLE_MIN_RADIUS: i32 = 5;
pub const PARTICLE_MAX_RADIUS: i32 = 15;

/// Capture settings applied to the camera right after it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub resolution: (i32, i32),
    pub fps: f64,
    /// Carried for callers that tune acquisition. Neither backend selection
    /// nor the read loop consults it.
    pub retry_attempts: u32,
    /// Not consulted; see `retry_attempts`.
    pub retry_delay: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            resolution: (640, 480),
            fps: 30.0,
            retry_attempts: 5,
            retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub device_index: i32,
    /// Cascade model path. `None` resolves OpenCV's bundled frontal face model.
    pub cascade_path: Option<PathBuf>,
    pub jpeg_quality: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            cascade_path: None,
            jpeg_quality: 90,
        }
    }
}
