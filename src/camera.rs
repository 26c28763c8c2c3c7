//! Camera acquisition with ordered backend fallback.
//!
//! Which capture backend works is platform dependent and can only be found
//! out by trying. [`try_backends`] walks an ordered strategy list and keeps
//! the first device that both opens and accepts the [`CameraConfig`].

use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use tracing::{debug, info, warn};

use crate::config::CameraConfig;
use crate::error::CameraError;

/// An opened capture device.
pub trait CameraDevice: Send {
    fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    /// Read one frame. [`CameraError::Closed`] means no more frames will come,
    /// every other error is transient.
    fn read(&mut self) -> Result<Mat, CameraError>;

    fn release(&mut self);
}

/// A strategy for opening a device by index.
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;
    fn open(&self, index: i32) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// Owns an acquired device and releases it exactly once.
pub struct CameraHandle {
    backend: String,
    device: Option<Box<dyn CameraDevice>>,
}

impl CameraHandle {
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn read(&mut self) -> Result<Mat, CameraError> {
        match self.device.as_mut() {
            Some(device) => device.read(),
            None => Err(CameraError::Closed),
        }
    }

    pub fn is_released(&self) -> bool {
        self.device.is_none()
    }

    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            info!(backend = %self.backend, "camera released");
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open device `index` with the first backend that opens and configures.
///
/// A device that opens but rejects the configuration is released before the
/// next backend is tried.
pub fn try_backends(
    backends: &[Box<dyn CameraBackend>],
    index: i32,
    config: &CameraConfig,
) -> Result<CameraHandle, CameraError> {
    let mut tried = Vec::with_capacity(backends.len());
    for backend in backends {
        tried.push(backend.name().to_string());

        let mut device = match backend.open(index) {
            Ok(device) => device,
            Err(err) => {
                warn!(backend = backend.name(), %err, "camera backend failed to open");
                continue;
            }
        };

        if let Err(err) = device.configure(config) {
            warn!(backend = backend.name(), %err, "camera backend failed to configure");
            device.release();
            continue;
        }

        info!(backend = backend.name(), index, "camera acquired");
        return Ok(CameraHandle {
            backend: backend.name().to_string(),
            device: Some(device),
        });
    }
    Err(CameraError::Unavailable { tried })
}

/// Backends to try on this platform, generic first.
pub fn platform_backends() -> Vec<Box<dyn CameraBackend>> {
    let mut backends: Vec<Box<dyn CameraBackend>> =
        vec![Box::new(OpenCvBackend::new("any", videoio::CAP_ANY))];
    #[cfg(target_os = "linux")]
    {
        backends.push(Box::new(OpenCvBackend::new("v4l2", videoio::CAP_V4L2)));
        backends.push(Box::new(OpenCvBackend::new(
            "gstreamer",
            videoio::CAP_GSTREAMER,
        )));
    }
    #[cfg(target_os = "windows")]
    {
        backends.push(Box::new(OpenCvBackend::new("dshow", videoio::CAP_DSHOW)));
        backends.push(Box::new(OpenCvBackend::new("msmf", videoio::CAP_MSMF)));
    }
    #[cfg(target_os = "macos")]
    {
        backends.push(Box::new(OpenCvBackend::new(
            "avfoundation",
            videoio::CAP_AVFOUNDATION,
        )));
    }
    backends
}

pub struct OpenCvBackend {
    name: &'static str,
    api_preference: i32,
}

impl OpenCvBackend {
    pub fn new(name: &'static str, api_preference: i32) -> Self {
        Self {
            name,
            api_preference,
        }
    }
}

impl CameraBackend for OpenCvBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn open(&self, index: i32) -> Result<Box<dyn CameraDevice>, CameraError> {
        let capture =
            VideoCapture::new(index, self.api_preference).map_err(|err| CameraError::Open {
                backend: self.name.to_string(),
                reason: err.to_string(),
            })?;
        if !capture.is_opened()? {
            return Err(CameraError::Open {
                backend: self.name.to_string(),
                reason: format!("device {index} did not open"),
            });
        }
        Ok(Box::new(OpenCvDevice {
            backend: self.name,
            capture,
        }))
    }
}

struct OpenCvDevice {
    backend: &'static str,
    capture: VideoCapture,
}

impl CameraDevice for OpenCvDevice {
    fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        let (width, height) = config.resolution;
        let properties = [
            ("width", videoio::CAP_PROP_FRAME_WIDTH, width as f64),
            ("height", videoio::CAP_PROP_FRAME_HEIGHT, height as f64),
            ("fps", videoio::CAP_PROP_FPS, config.fps),
        ];
        for (label, property, value) in properties {
            let accepted =
                self.capture
                    .set(property, value)
                    .map_err(|err| CameraError::Configure {
                        backend: self.backend.to_string(),
                        reason: format!("{label}: {err}"),
                    })?;
            if !accepted {
                debug!(backend = self.backend, label, value, "camera ignored property");
            }
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Mat, CameraError> {
        if !self.capture.is_opened()? {
            return Err(CameraError::Closed);
        }
        let mut frame = Mat::default();
        let grabbed = self
            .capture
            .read(&mut frame)
            .map_err(|err| CameraError::ReadFailed(err.to_string()))?;
        if !grabbed || frame.size()?.width == 0 {
            return Err(CameraError::ReadFailed("no frame returned".to_string()));
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if let Err(err) = self.capture.release() {
            warn!(backend = self.backend, %err, "failed to release camera");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeBackend {
        name: &'static str,
        opens: bool,
        configures: bool,
        releases: Arc<AtomicUsize>,
    }

    struct FakeDevice {
        configures: bool,
        releases: Arc<AtomicUsize>,
    }

    impl CameraBackend for FakeBackend {
        fn name(&self) -> &str {
            self.name
        }

        fn open(&self, _index: i32) -> Result<Box<dyn CameraDevice>, CameraError> {
            if !self.opens {
                return Err(CameraError::Open {
                    backend: self.name.to_string(),
                    reason: "no device".to_string(),
                });
            }
            Ok(Box::new(FakeDevice {
                configures: self.configures,
                releases: self.releases.clone(),
            }))
        }
    }

    impl CameraDevice for FakeDevice {
        fn configure(&mut self, _config: &CameraConfig) -> Result<(), CameraError> {
            if self.configures {
                Ok(())
            } else {
                Err(CameraError::Configure {
                    backend: "fake".to_string(),
                    reason: "rejected".to_string(),
                })
            }
        }

        fn read(&mut self) -> Result<Mat, CameraError> {
            Err(CameraError::Closed)
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn backend(
        name: &'static str,
        opens: bool,
        configures: bool,
        releases: &Arc<AtomicUsize>,
    ) -> Box<dyn CameraBackend> {
        Box::new(FakeBackend {
            name,
            opens,
            configures,
            releases: releases.clone(),
        })
    }

    #[test]
    fn first_working_backend_wins() {
        let releases = Arc::new(AtomicUsize::new(0));
        let backends = vec![
            backend("broken", false, true, &releases),
            backend("good", true, true, &releases),
            backend("also-good", true, true, &releases),
        ];

        let handle = try_backends(&backends, 0, &CameraConfig::default()).unwrap();
        assert_eq!(handle.backend(), "good");
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn configure_failure_releases_and_falls_through() {
        let releases = Arc::new(AtomicUsize::new(0));
        let backends = vec![
            backend("picky", true, false, &releases),
            backend("good", true, true, &releases),
        ];

        let handle = try_backends(&backends, 0, &CameraConfig::default()).unwrap();
        assert_eq!(handle.backend(), "good");
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_working_backend_is_unavailable() {
        let releases = Arc::new(AtomicUsize::new(0));
        let backends = vec![
            backend("broken", false, true, &releases),
            backend("picky", true, false, &releases),
        ];

        let err = try_backends(&backends, 0, &CameraConfig::default())
            .err()
            .unwrap();
        match err {
            CameraError::Unavailable { tried } => assert_eq!(tried, vec!["broken", "picky"]),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_backend_list_is_unavailable() {
        let err = try_backends(&[], 0, &CameraConfig::default()).err().unwrap();
        assert!(matches!(err, CameraError::Unavailable { tried } if tried.is_empty()));
    }

    #[test]
    fn handle_releases_exactly_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let backends = vec![backend("good", true, true, &releases)];

        let mut handle = try_backends(&backends, 0, &CameraConfig::default()).unwrap();
        handle.release();
        handle.release();
        assert!(handle.is_released());
        assert!(matches!(handle.read(), Err(CameraError::Closed)));
        drop(handle);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_handle_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        let backends = vec![backend("good", true, true, &releases)];

        drop(try_backends(&backends, 0, &CameraConfig::default()).unwrap());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn platform_list_starts_with_generic_backend() {
        let backends = platform_backends();
        assert_eq!(backends[0].name(), "any");
    }
}
