use std::path::Path;

use anyhow::Context;
use opencv::core::{Rect, Size, Vector};
use opencv::prelude::*;
use opencv::{core, imgproc, objdetect};

use crate::config::{MIN_FACE_SIZE, MIN_NEIGHBORS, SCALE_FACTOR};

/// Axis aligned face rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<Rect> for FaceRegion {
    fn from(rect: Rect) -> Self {
        Self::new(rect.x, rect.y, rect.width, rect.height)
    }
}

impl From<FaceRegion> for Rect {
    fn from(face: FaceRegion) -> Self {
        Rect::new(face.x, face.y, face.width, face.height)
    }
}

pub trait FaceDetector: Send {
    /// Find faces in a single channel image.
    fn detect(&mut self, gray: &Mat) -> anyhow::Result<Vec<FaceRegion>>;
}

pub struct HaarCascadeDetector {
    classifier: objdetect::CascadeClassifier,
}

impl HaarCascadeDetector {
    /// Load a cascade from `path`, or OpenCV's bundled frontal face model.
    pub fn new(path: Option<&Path>) -> anyhow::Result<Self> {
        let xml = match path {
            Some(path) => path.to_string_lossy().into_owned(),
            None => core::find_file_def(crate::config::DEFAULT_CASCADE)
                .context("failed to locate bundled face cascade")?,
        };
        let classifier = objdetect::CascadeClassifier::new(&xml)
            .with_context(|| format!("failed to load face cascade {xml}"))?;
        if classifier.empty()? {
            anyhow::bail!("face cascade {xml} is empty");
        }
        Ok(Self { classifier })
    }
}

impl FaceDetector for HaarCascadeDetector {
    fn detect(&mut self, gray: &Mat) -> anyhow::Result<Vec<FaceRegion>> {
        let mut faces = Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            gray,
            &mut faces,
            SCALE_FACTOR,
            MIN_NEIGHBORS,
            objdetect::CASCADE_SCALE_IMAGE,
            Size {
                width: MIN_FACE_SIZE,
                height: MIN_FACE_SIZE,
            },
            Size {
                width: 0,
                height: 0,
            },
        )?;
        Ok(faces.into_iter().map(FaceRegion::from).collect())
    }
}

pub fn convert_to_grayscale(image: &Mat) -> opencv::Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

pub fn mirror(image: &Mat) -> opencv::Result<Mat> {
    let mut mirrored = Mat::default();
    core::flip(image, &mut mirrored, 1)?;
    Ok(mirrored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    #[test]
    fn face_region_round_trips_through_rect() {
        let face = FaceRegion::new(10, 20, 30, 40);
        let rect: Rect = face.into();
        assert_eq!(rect, Rect::new(10, 20, 30, 40));
        assert_eq!(FaceRegion::from(rect), face);
    }

    #[test]
    fn mirror_flips_columns() {
        let mut frame = Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::all(0.)).unwrap();
        frame.at_2d_mut::<Vec3b>(0, 0).unwrap().0 = [1, 2, 3];

        let mirrored = mirror(&frame).unwrap();
        assert_eq!(mirrored.at_2d::<Vec3b>(0, 2).unwrap().0, [1, 2, 3]);
        assert_eq!(mirrored.at_2d::<Vec3b>(0, 0).unwrap().0, [0, 0, 0]);
    }

    #[test]
    fn grayscale_has_single_channel() {
        let frame = Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(128.)).unwrap();
        let gray = convert_to_grayscale(&frame).unwrap();
        assert_eq!(gray.channels(), 1);
        assert_eq!(gray.rows(), 4);
    }
}
