pub mod camera;
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod server;
pub mod stream;

pub use camera::{try_backends, CameraBackend, CameraDevice, CameraHandle};
pub use config::{CameraConfig, PipelineConfig};
pub use detector::{FaceDetector, FaceRegion, HaarCascadeDetector};
pub use error::{CameraError, OverlayError};
pub use overlay::{CharacterSprite, ParticleBurst};
pub use pipeline::{AppContext, FaceAnnotation, FramePipeline};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
