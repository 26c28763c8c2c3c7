//! Decorations drawn around detected faces.
//!
//! Every operation reports its own outcome. Callers decide whether a failure
//! matters; the frame pipeline logs it and moves on to the next step.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use opencv::core::{self, Point, Rect, Scalar, Size, CV_8UC3};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};
use rand::Rng;
use tracing::{info, warn};

use crate::config::{
    CAPTION, CAPTION_OFFSET, CAPTION_SCALE, CAPTION_THICKNESS, FRAME_WEIGHT, OUTLINE_THICKNESS,
    PARTICLES_PER_BURST, PARTICLE_INTERVAL, PARTICLE_MAX_RADIUS, PARTICLE_MIN_RADIUS, SPRITE_SIZE,
    SPRITE_WEIGHT,
};
use crate::detector::FaceRegion;
use crate::error::OverlayError;

fn outline_color() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn caption_color() -> Scalar {
    Scalar::new(255.0, 0.0, 255.0, 0.0)
}

/// The character blended above each face, always `SPRITE_SIZE` square BGR.
pub struct CharacterSprite {
    image: Mat,
    placeholder: bool,
}

impl CharacterSprite {
    /// Load and resize the sprite at `path`. Falls back to a blank sprite
    /// when the asset is missing or cannot be decoded.
    pub fn load(path: &Path) -> opencv::Result<Self> {
        match Self::read(path) {
            Ok(sprite) => {
                info!(path = %path.display(), "loaded character sprite");
                Ok(sprite)
            }
            Err(err) => {
                warn!(path = %path.display(), "character sprite unavailable, using blank placeholder: {err:#}");
                Self::placeholder()
            }
        }
    }

    pub fn placeholder() -> opencv::Result<Self> {
        let image =
            Mat::new_rows_cols_with_default(SPRITE_SIZE, SPRITE_SIZE, CV_8UC3, Scalar::all(0.0))?;
        Ok(Self {
            image,
            placeholder: true,
        })
    }

    /// Wrap an already sized `CV_8UC3` image.
    pub fn from_mat(image: Mat) -> anyhow::Result<Self> {
        let size = image.size()?;
        if size != Size::new(SPRITE_SIZE, SPRITE_SIZE) {
            bail!(
                "sprite must be {SPRITE_SIZE}x{SPRITE_SIZE}, got {}x{}",
                size.width,
                size.height
            );
        }
        if image.typ() != CV_8UC3 {
            bail!("sprite must be 8 bit BGR, got mat type {}", image.typ());
        }
        Ok(Self {
            image,
            placeholder: false,
        })
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn image(&self) -> &Mat {
        &self.image
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let image = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_UNCHANGED)?;
        if image.size()?.width == 0 {
            bail!("image could not be decoded");
        }

        let conversion = match image.channels() {
            3 => None,
            4 => Some(imgproc::COLOR_BGRA2BGR),
            1 => Some(imgproc::COLOR_GRAY2BGR),
            channels => bail!("unsupported channel count {channels}"),
        };
        let bgr = match conversion {
            Some(code) => {
                let mut converted = Mat::default();
                imgproc::cvt_color_def(&image, &mut converted, code)?;
                converted
            }
            None => image,
        };

        let mut resized = Mat::default();
        imgproc::resize(
            &bgr,
            &mut resized,
            Size::new(SPRITE_SIZE, SPRITE_SIZE),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )
        .context("failed to resize sprite")?;
        Self::from_mat(resized)
    }
}

pub fn draw_outline(frame: &mut Mat, face: FaceRegion) -> Result<Rect, OverlayError> {
    let rect = Rect::from(face);
    imgproc::rectangle(
        frame,
        rect,
        outline_color(),
        OUTLINE_THICKNESS,
        imgproc::LINE_8,
        0,
    )?;
    Ok(rect)
}

/// Where the sprite goes for `face`: centered horizontally on the face with
/// its vertical center on the face's top edge, pulled back inside the frame.
/// `None` when the frame is too small to hold the whole sprite.
pub fn character_placement(frame_width: i32, frame_height: i32, face: FaceRegion) -> Option<Rect> {
    let char_x = face.x + face.width / 2 - SPRITE_SIZE / 2;
    let char_y = face.y - SPRITE_SIZE / 2;

    let x = char_x.min(frame_width - SPRITE_SIZE).max(0);
    let y = char_y.min(frame_height - SPRITE_SIZE).max(0);

    let width = SPRITE_SIZE.min(frame_width - x);
    let height = SPRITE_SIZE.min(frame_height - y);
    if width != SPRITE_SIZE || height != SPRITE_SIZE {
        return None;
    }
    Some(Rect::new(x, y, SPRITE_SIZE, SPRITE_SIZE))
}

/// Blend the sprite over the frame above `face`. Returns the blended region,
/// or `None` when the sprite did not fit and the frame was left alone.
pub fn overlay_character(
    frame: &mut Mat,
    face: FaceRegion,
    sprite: &CharacterSprite,
) -> Result<Option<Rect>, OverlayError> {
    let sprite = sprite.image();
    if frame.typ() != CV_8UC3 || sprite.typ() != CV_8UC3 {
        return Err(OverlayError::UnsupportedFrame {
            frame: frame.typ(),
            sprite: sprite.typ(),
        });
    }
    let size = frame.size()?;
    let Some(placement) = character_placement(size.width, size.height, face) else {
        return Ok(None);
    };

    let mut blended = Mat::default();
    {
        let region = Mat::roi(frame, placement)?;
        core::add_weighted(
            &*region,
            FRAME_WEIGHT,
            sprite,
            SPRITE_WEIGHT,
            0.0,
            &mut blended,
            -1,
        )?;
    }
    let mut region = Mat::roi_mut(frame, placement)?;
    blended.copy_to(&mut *region)?;
    Ok(Some(placement))
}

/// Write the caption up and to the left of the face. Returns the text origin.
pub fn draw_caption(frame: &mut Mat, face: FaceRegion) -> Result<Point, OverlayError> {
    let origin = Point::new(face.x - CAPTION_OFFSET, face.y - CAPTION_OFFSET);
    imgproc::put_text(
        frame,
        CAPTION,
        origin,
        imgproc::FONT_HERSHEY_DUPLEX,
        CAPTION_SCALE,
        caption_color(),
        CAPTION_THICKNESS,
        imgproc::LINE_8,
        false,
    )?;
    Ok(origin)
}

/// Rate limiter and painter for particle bursts.
///
/// One clock is shared by every face in a frame, so a burst is drawn at most
/// once per interval no matter how many faces are visible.
#[derive(Debug, Clone)]
pub struct ParticleBurst {
    last_emission: Option<Instant>,
    interval: Duration,
}

impl Default for ParticleBurst {
    fn default() -> Self {
        Self::new(PARTICLE_INTERVAL)
    }
}

impl ParticleBurst {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emission: None,
            interval,
        }
    }

    pub fn last_emission(&self) -> Option<Instant> {
        self.last_emission
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_emission {
            Some(last) => now.saturating_duration_since(last) > self.interval,
            None => true,
        }
    }

    /// Draw a burst inside `face` if one is due. Returns the number of
    /// particles drawn.
    pub fn try_emit<R: Rng + ?Sized>(
        &mut self,
        frame: &mut Mat,
        face: FaceRegion,
        now: Instant,
        rng: &mut R,
    ) -> Result<usize, OverlayError> {
        if !self.is_due(now) {
            return Ok(0);
        }
        for _ in 0..PARTICLES_PER_BURST {
            let center = Point::new(
                face.x + rng.gen_range(0..=face.width.max(0)),
                face.y + rng.gen_range(0..=face.height.max(0)),
            );
            let radius = rng.gen_range(PARTICLE_MIN_RADIUS..=PARTICLE_MAX_RADIUS);
            let color = Scalar::new(
                rng.gen_range(0..=255) as f64,
                rng.gen_range(0..=255) as f64,
                rng.gen_range(0..=255) as f64,
                0.0,
            );
            imgproc::circle(
                frame,
                center,
                radius,
                color,
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )?;
        }
        self.last_emission = Some(now);
        Ok(PARTICLES_PER_BURST)
    }
}
