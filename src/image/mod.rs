//! Owned raster images and pixel rectangles.
//!
//! `RasterImage` is an immutable RGB8 buffer. Every pipeline stage borrows it
//! read-only; stages that need intensity data derive a grayscale copy with
//! [`RasterImage::to_gray`]. Inputs carrying an alpha channel are flattened
//! over white when constructed, so transparent areas read as background.

use crate::util::{DecodeError, IconMatchError, IconMatchResult};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod codec;

/// Axis-aligned pixel rectangle `(x, y, width, height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Area in pixels.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Returns true if `other` lies entirely within `self`.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grows the box by `pad` on every side, clamped to a `width x height` image.
    ///
    /// The origin is clamped at zero first; the extent is then limited to what
    /// remains of the image from the clamped origin.
    pub fn expand_clamped(&self, pad: u32, width: u32, height: u32) -> BoundingBox {
        let x = self.x.saturating_sub(pad);
        let y = self.y.saturating_sub(pad);
        BoundingBox {
            x,
            y,
            width: (self.width + 2 * pad).min(width.saturating_sub(x)),
            height: (self.height + 2 * pad).min(height.saturating_sub(y)),
        }
    }
}

/// Owned RGB8 raster produced by the codec.
#[derive(Clone, Debug)]
pub struct RasterImage {
    pixels: RgbImage,
}

impl RasterImage {
    /// Wraps an RGB buffer, rejecting empty images.
    pub fn from_rgb(pixels: RgbImage) -> Result<Self, DecodeError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }
        Ok(Self { pixels })
    }

    /// Converts a decoded image of any color model, flattening alpha over white.
    pub fn from_dynamic(img: DynamicImage) -> Result<Self, DecodeError> {
        if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            let mut out = RgbImage::new(rgba.width(), rgba.height());
            for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
                let a = u32::from(src[3]);
                let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
                *dst = Rgb([blend(src[0]), blend(src[1]), blend(src[2])]);
            }
            return Self::from_rgb(out);
        }
        Self::from_rgb(img.to_rgb8())
    }

    /// Loads an image file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> IconMatchResult<Self> {
        let img = image::open(path).map_err(|err| DecodeError::Image {
            reason: err.to_string(),
        })?;
        Ok(Self::from_dynamic(img)?)
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Number of color channels (always 3).
    pub fn channels(&self) -> u8 {
        3
    }

    /// Returns the underlying RGB buffer.
    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    /// Single-channel intensity copy.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.pixels)
    }

    /// Copies a sub-rectangle into a new raster.
    pub fn crop(&self, rect: BoundingBox) -> IconMatchResult<RasterImage> {
        let (img_width, img_height) = self.dimensions();
        if rect.width == 0
            || rect.height == 0
            || rect.right() > img_width
            || rect.bottom() > img_height
        {
            return Err(IconMatchError::RegionOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                img_width,
                img_height,
            });
        }
        let pixels =
            image::imageops::crop_imm(&self.pixels, rect.x, rect.y, rect.width, rect.height)
                .to_image();
        Ok(RasterImage { pixels })
    }
}
