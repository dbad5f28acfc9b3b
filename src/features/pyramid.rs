//! Scale pyramid construction for grayscale images.
//!
//! Level `k` of a plain pyramid is the base image shrunk by
//! `scale_factor^k` with a triangle filter. An optional 2x upsampled level is
//! prepended for small inputs so fine corners on tiny icons survive FAST.
//! Every level records the factor that maps its pixel coordinates back to
//! base-image coordinates.

use image::imageops::{self, FilterType};
use image::GrayImage;

/// Smallest level side that still fits a FAST circle with some margin.
const MIN_LEVEL_SIDE: u32 = 16;

/// One pyramid level.
pub struct PyramidLevel {
    /// Level pixels.
    pub image: GrayImage,
    /// Multiply level coordinates by this to get base-image coordinates.
    pub scale: f32,
}

/// Factor used between levels; factors that would not shrink fall back to 2.
pub fn effective_scale_factor(scale_factor: f32) -> f32 {
    if scale_factor > 1.0 {
        scale_factor
    } else {
        2.0
    }
}

/// Owned scale pyramid built from a base level.
pub struct ScalePyramid {
    levels: Vec<PyramidLevel>,
}

impl ScalePyramid {
    /// Builds a pyramid with up to `n_levels` levels at or below native size.
    ///
    /// `n_levels` is clamped to at least 1 so the base level is always present.
    /// When `upsample` is set, a level at twice the native size comes first.
    pub fn build(base: &GrayImage, n_levels: usize, scale_factor: f32, upsample: bool) -> Self {
        let n_levels = n_levels.max(1);
        let scale_factor = effective_scale_factor(scale_factor);
        let (width, height) = base.dimensions();
        let mut levels = Vec::with_capacity(n_levels + 1);

        if upsample && width > 0 && height > 0 {
            levels.push(PyramidLevel {
                image: imageops::resize(base, width * 2, height * 2, FilterType::Triangle),
                scale: 0.5,
            });
        }
        levels.push(PyramidLevel {
            image: base.clone(),
            scale: 1.0,
        });

        let mut scale = 1.0f32;
        for _ in 1..n_levels {
            scale *= scale_factor;
            let dst_width = (width as f32 / scale).round() as u32;
            let dst_height = (height as f32 / scale).round() as u32;
            if dst_width < MIN_LEVEL_SIDE || dst_height < MIN_LEVEL_SIDE {
                break;
            }
            levels.push(PyramidLevel {
                image: imageops::resize(base, dst_width, dst_height, FilterType::Triangle),
                scale: width as f32 / dst_width as f32,
            });
        }

        Self { levels }
    }

    /// Returns all pyramid levels, finest first.
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    /// Returns a specific level.
    pub fn level(&self, index: usize) -> Option<&PyramidLevel> {
        self.levels.get(index)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
