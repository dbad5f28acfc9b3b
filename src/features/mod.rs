//! Keypoints, binary descriptors, and feature extraction.
//!
//! Features are ORB-style: FAST-9 corners detected over a scale pyramid,
//! oriented by the intensity centroid of a circular patch, and described by a
//! 256-bit steered BRIEF test pattern. Descriptors compare by Hamming distance.

use crate::image::RasterImage;
use serde::{Deserialize, Serialize};

mod orb;
pub mod pyramid;

pub use orb::OrbExtractor;

/// A detected keypoint in the coordinate space of the image it came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// X coordinate (column) in base-image pixels.
    pub x: f32,
    /// Y coordinate (row) in base-image pixels.
    pub y: f32,
    /// Diameter of the described patch in base-image pixels.
    pub size: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// FAST corner score.
    pub response: f32,
    /// Pyramid level the keypoint was detected on.
    pub octave: u8,
}

/// 256-bit binary descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    /// Number of bits in a descriptor.
    pub const BITS: usize = 256;

    /// Hamming distance to another descriptor.
    #[inline]
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Returns bit `idx` (0..256).
    #[inline]
    pub fn bit(&self, idx: usize) -> bool {
        (self.0[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[inline]
    pub(crate) fn set_bit(&mut self, idx: usize) {
        self.0[idx / 64] |= 1 << (idx % 64);
    }
}

/// Ordered keypoints with their descriptors, paired 1:1.
#[derive(Clone, Debug, Default)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    /// Builds a set from `(keypoint, descriptor)` pairs.
    pub fn from_pairs<I: IntoIterator<Item = (Keypoint, Descriptor)>>(pairs: I) -> Self {
        let (keypoints, descriptors) = pairs.into_iter().unzip();
        Self {
            keypoints,
            descriptors,
        }
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Returns true if no features were detected.
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Iterates `(keypoint, descriptor)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&Keypoint, &Descriptor)> {
        self.keypoints.iter().zip(self.descriptors.iter())
    }
}

/// Feature extraction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Upper bound on features kept per image.
    pub max_features: usize,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Number of pyramid levels at or below native resolution.
    pub n_levels: usize,
    /// Downscale factor between consecutive levels.
    pub scale_factor: f32,
    /// Images whose shorter side is below this also get a 2x upsampled level.
    pub upsample_below: u32,
    /// Radius of the orientation and descriptor patch in level pixels.
    pub patch_radius: u32,
    /// Gaussian sigma applied before sampling descriptor tests.
    pub blur_sigma: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_features: 1000,
            fast_threshold: 20,
            n_levels: 6,
            scale_factor: 1.2,
            upsample_below: 80,
            patch_radius: 15,
            blur_sigma: 2.0,
        }
    }
}

/// Computes features for a whole image.
///
/// Implementations must return an empty set, not fail, when nothing is
/// detectable.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image: &RasterImage) -> FeatureSet;
}

/// Extracts features with the default ORB extractor.
pub fn extract(image: &RasterImage, cfg: &FeatureConfig) -> FeatureSet {
    OrbExtractor::new(cfg.clone()).extract(image)
}
