//! Per frame orchestration: read, mirror, detect, decorate, encode.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use opencv::core::{Point, Rect, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::camera::{platform_backends, try_backends, CameraBackend, CameraHandle};
use crate::config::{CameraConfig, PipelineConfig};
use crate::detector::{convert_to_grayscale, mirror, FaceDetector, FaceRegion, HaarCascadeDetector};
use crate::error::{CameraError, OverlayError};
use crate::overlay::{
    draw_caption, draw_outline, overlay_character, CharacterSprite, ParticleBurst,
};

/// Process wide state, built once at startup and shared read only.
pub struct AppContext {
    pub sprite: CharacterSprite,
    pub camera: CameraConfig,
    pub pipeline: PipelineConfig,
    pub backends: Vec<Box<dyn CameraBackend>>,
}

impl AppContext {
    pub fn new(sprite: CharacterSprite, camera: CameraConfig, pipeline: PipelineConfig) -> Self {
        Self {
            sprite,
            camera,
            pipeline,
            backends: platform_backends(),
        }
    }

    pub fn with_backends(mut self, backends: Vec<Box<dyn CameraBackend>>) -> Self {
        self.backends = backends;
        self
    }
}

/// What was drawn for a single face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAnnotation {
    pub face: FaceRegion,
    pub outline: Option<Rect>,
    pub character: Option<Rect>,
    pub caption: Option<Point>,
    pub particles: usize,
}

/// Pull based producer of annotated frames.
///
/// Each `next` blocks until a frame has been read and processed. The sequence
/// ends only when the camera closes, and it cannot be restarted. Failed reads
/// are skipped.
/// The camera is released on [`FramePipeline::close`] or on drop.
pub struct FramePipeline {
    context: Arc<AppContext>,
    camera: CameraHandle,
    detector: Box<dyn FaceDetector>,
    particles: ParticleBurst,
    rng: StdRng,
    frames: u64,
}

impl FramePipeline {
    /// Load the face detector and acquire the camera.
    pub fn start(context: Arc<AppContext>) -> anyhow::Result<Self> {
        let detector = HaarCascadeDetector::new(context.pipeline.cascade_path.as_deref())?;
        let camera = try_backends(
            &context.backends,
            context.pipeline.device_index,
            &context.camera,
        )?;
        info!(backend = camera.backend(), "frame pipeline started");
        Ok(Self::new(context, camera, Box::new(detector)))
    }

    pub fn new(
        context: Arc<AppContext>,
        camera: CameraHandle,
        detector: Box<dyn FaceDetector>,
    ) -> Self {
        Self {
            context,
            camera,
            detector,
            particles: ParticleBurst::default(),
            rng: StdRng::from_entropy(),
            frames: 0,
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.camera.is_released()
    }

    /// Next annotated frame, or `None` once the camera is done.
    pub fn next_frame(&mut self) -> Option<Mat> {
        loop {
            let raw = match self.camera.read() {
                Ok(raw) => raw,
                Err(CameraError::Closed) => {
                    self.close();
                    return None;
                }
                Err(err) => {
                    warn!(%err, "camera read failed, skipping frame");
                    continue;
                }
            };

            match self.process(&raw, Instant::now()) {
                Ok(frame) => return Some(frame),
                Err(err) => warn!("dropping frame: {err:#}"),
            }
        }
    }

    /// Run one frame through mirror, detection and the overlays.
    pub fn process(&mut self, raw: &Mat, now: Instant) -> anyhow::Result<Mat> {
        let mut frame = mirror(raw).context("failed to mirror frame")?;
        let gray = convert_to_grayscale(&frame).context("failed to convert frame to grayscale")?;
        let faces = self
            .detector
            .detect(&gray)
            .context("face detection failed")?;
        debug!(faces = faces.len(), "detected faces");

        self.annotate(&mut frame, &faces, now);
        Ok(frame)
    }

    /// Decorate every face. A failing overlay is logged and skipped, the
    /// remaining overlays still run.
    pub fn annotate(
        &mut self,
        frame: &mut Mat,
        faces: &[FaceRegion],
        now: Instant,
    ) -> Vec<FaceAnnotation> {
        let mut annotations = Vec::with_capacity(faces.len());
        for &face in faces {
            let outline = logged("outline", face, draw_outline(frame, face));
            let character = logged(
                "character",
                face,
                overlay_character(frame, face, &self.context.sprite),
            )
            .flatten();
            let caption = logged("caption", face, draw_caption(frame, face));
            let particles = logged(
                "particles",
                face,
                self.particles.try_emit(frame, face, now, &mut self.rng),
            )
            .unwrap_or(0);

            annotations.push(FaceAnnotation {
                face,
                outline,
                character,
                caption,
                particles,
            });
        }
        annotations
    }

    /// Release the camera. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.camera.is_released() {
            info!(frames = self.frames, "closing frame pipeline");
            self.camera.release();
        }
    }
}

impl Iterator for FramePipeline {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            let frame = self.next_frame()?;
            match encode_jpeg(&frame, self.context.pipeline.jpeg_quality) {
                Ok(jpeg) => {
                    self.frames += 1;
                    return Some(jpeg);
                }
                Err(err) => warn!(%err, "failed to encode frame, dropping it"),
            }
        }
    }
}

fn logged<T>(step: &str, face: FaceRegion, result: Result<T, OverlayError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(step, ?face, %err, "overlay failed");
            None
        }
    }
}

pub fn encode_jpeg(frame: &Mat, quality: i32) -> opencv::Result<Vec<u8>> {
    let params = Vector::<i32>::from_iter([imgcodecs::IMWRITE_JPEG_QUALITY, quality.clamp(1, 100)]);
    let mut buffer = Vector::<u8>::new();
    if !imgcodecs::imencode(".jpg", frame, &mut buffer, &params)? {
        return Err(opencv::Error::new(
            opencv::core::StsError,
            "jpeg encoder rejected frame".to_string(),
        ));
    }
    Ok(buffer.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn encoded_frame_is_jpeg() {
        let frame = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(40.0)).unwrap();
        let jpeg = encode_jpeg(&frame, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn encoding_empty_frame_fails() {
        assert!(encode_jpeg(&Mat::default(), 90).is_err());
    }
}
