use std::path::PathBuf;

use clap::Args;

use crate::config::{CameraConfig, PipelineConfig, DEFAULT_SPRITE_PATH};

/// Camera and asset flags shared by the server and the preview window.
#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Character image blended above each face.
    #[clap(long, env = "SPRITE_PATH", default_value = DEFAULT_SPRITE_PATH)]
    pub sprite: PathBuf,

    /// Haar cascade model. Defaults to the one bundled with OpenCV.
    #[clap(long, env = "CASCADE_PATH")]
    pub cascade: Option<PathBuf>,

    /// Camera device index.
    #[clap(long, default_value_t = 0)]
    pub device: i32,

    #[clap(long, default_value_t = 640)]
    pub width: i32,

    #[clap(long, default_value_t = 480)]
    pub height: i32,

    #[clap(long, default_value_t = 30.0)]
    pub fps: f64,

    #[clap(long, default_value_t = 90, value_parser = clap::value_parser!(i32).range(1..=100))]
    pub jpeg_quality: i32,
}

impl CaptureArgs {
    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            resolution: (self.width, self.height),
            fps: self.fps,
            ..CameraConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            device_index: self.device,
            cascade_path: self.cascade.clone(),
            jpeg_quality: self.jpeg_quality,
        }
    }
}
