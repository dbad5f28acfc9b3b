//! ORB-style detector and descriptor.
//!
//! Per level: FAST-9 corners, 3x3 non-maximum suppression on the corner
//! score, strongest-first retention within a per-level quota, intensity
//! centroid orientation, then a steered BRIEF descriptor sampled on a
//! Gaussian-smoothed copy of the level. All patch reads clamp to the image
//! border, so corners close to the edge of a tight icon crop are kept.

use crate::features::pyramid::{effective_scale_factor, PyramidLevel, ScalePyramid};
use crate::features::{Descriptor, FeatureConfig, FeatureExtractor, FeatureSet, Keypoint};
use crate::image::RasterImage;
use crate::trace::{trace_event, trace_span};
use crate::util::math::clamp_coord;
use image::GrayImage;
use imageproc::corners::{corners_fast9, Corner};
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::sync::OnceLock;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Test point pairs live inside this radius so any rotation stays in the patch.
const PATTERN_RADIUS: i32 = 13;
const PATTERN_SEED: u64 = 0x1C0_4A7C;

/// `(x1, y1, x2, y2)` offsets for each of the 256 intensity tests.
fn brief_pattern() -> &'static [[i8; 4]; Descriptor::BITS] {
    static PATTERN: OnceLock<[[i8; 4]; Descriptor::BITS]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let mut sample = || loop {
            let x = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let y = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
                return (x as i8, y as i8);
            }
        };
        let mut pattern = [[0i8; 4]; Descriptor::BITS];
        for pair in pattern.iter_mut() {
            let (x1, y1) = sample();
            let (mut x2, mut y2) = sample();
            while (x1, y1) == (x2, y2) {
                (x2, y2) = sample();
            }
            *pair = [x1, y1, x2, y2];
        }
        pattern
    })
}

/// ORB feature extractor.
#[derive(Clone, Debug, Default)]
pub struct OrbExtractor {
    cfg: FeatureConfig,
}

impl OrbExtractor {
    pub fn new(cfg: FeatureConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.cfg
    }

    /// Extracts features from a grayscale image.
    pub fn extract_gray(&self, gray: &GrayImage) -> FeatureSet {
        let cfg = &self.cfg;
        let (width, height) = gray.dimensions();
        let _span = trace_span!("extract_features", width = width, height = height).entered();
        if cfg.max_features == 0 || width == 0 || height == 0 {
            return FeatureSet::default();
        }

        let upsample = width.min(height) < cfg.upsample_below;
        let scale_factor = effective_scale_factor(cfg.scale_factor);
        let pyramid = ScalePyramid::build(gray, cfg.n_levels, scale_factor, upsample);
        let quotas = level_quotas(cfg.max_features, pyramid.len(), scale_factor);

        #[cfg(feature = "rayon")]
        let per_level: Vec<Vec<(Keypoint, Descriptor)>> = pyramid
            .levels()
            .par_iter()
            .zip(quotas.par_iter())
            .enumerate()
            .map(|(idx, (level, &quota))| self.describe_level(level, idx, quota))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let per_level: Vec<Vec<(Keypoint, Descriptor)>> = pyramid
            .levels()
            .iter()
            .zip(quotas.iter())
            .enumerate()
            .map(|(idx, (level, &quota))| self.describe_level(level, idx, quota))
            .collect();

        let features = FeatureSet::from_pairs(per_level.into_iter().flatten());
        trace_event!("features", count = features.len(), levels = pyramid.len());
        features
    }

    fn describe_level(
        &self,
        level: &PyramidLevel,
        octave: usize,
        quota: usize,
    ) -> Vec<(Keypoint, Descriptor)> {
        if quota == 0 {
            return Vec::new();
        }
        let corners = strongest_corners(&level.image, self.cfg.fast_threshold, quota);
        if corners.is_empty() {
            return Vec::new();
        }

        let radius = self.cfg.patch_radius.max(PATTERN_RADIUS as u32) as i32;
        let smoothed = if self.cfg.blur_sigma > 0.0 {
            gaussian_blur_f32(&level.image, self.cfg.blur_sigma)
        } else {
            level.image.clone()
        };

        corners
            .into_iter()
            .map(|corner| {
                let angle = intensity_centroid_angle(&level.image, corner.x, corner.y, radius);
                let descriptor = steered_brief(&smoothed, corner.x, corner.y, angle);
                let keypoint = Keypoint {
                    x: corner.x as f32 * level.scale,
                    y: corner.y as f32 * level.scale,
                    size: (2 * radius + 1) as f32 * level.scale,
                    angle,
                    response: corner.score,
                    octave: octave.min(u8::MAX as usize) as u8,
                };
                (keypoint, descriptor)
            })
            .collect()
    }
}

impl FeatureExtractor for OrbExtractor {
    fn extract(&self, image: &RasterImage) -> FeatureSet {
        self.extract_gray(&image.to_gray())
    }
}

/// Splits `total` features across levels, geometrically favouring fine levels.
fn level_quotas(total: usize, n_levels: usize, scale_factor: f32) -> Vec<usize> {
    if n_levels == 0 {
        return Vec::new();
    }
    let factor = 1.0 / scale_factor.max(1.0 + f32::EPSILON);
    let denom = 1.0 - factor.powi(n_levels as i32);
    let mut per_level = total as f32 * (1.0 - factor) / denom;
    let mut quotas = Vec::with_capacity(n_levels);
    let mut assigned = 0usize;
    for _ in 0..n_levels.saturating_sub(1) {
        let q = (per_level.round() as usize).min(total - assigned);
        quotas.push(q);
        assigned += q;
        per_level *= factor;
    }
    quotas.push(total - assigned);
    quotas
}

fn corner_cmp_desc(a: &Corner, b: &Corner) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.x.cmp(&b.x))
}

/// FAST-9 corners after 3x3 non-maximum suppression, strongest first.
fn strongest_corners(image: &GrayImage, threshold: u8, limit: usize) -> Vec<Corner> {
    let (width, height) = image.dimensions();
    let corners = corners_fast9(image, threshold);
    if corners.is_empty() {
        return corners;
    }

    let mut scores = vec![f32::NEG_INFINITY; (width * height) as usize];
    for c in &corners {
        scores[(c.y * width + c.x) as usize] = c.score;
    }

    let mut kept: Vec<Corner> = corners
        .into_iter()
        .filter(|c| {
            let own_idx = (c.y * width + c.x) as usize;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = c.x as i32 + dx;
                    let ny = c.y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    let idx = (ny as u32 * width + nx as u32) as usize;
                    let other = scores[idx];
                    // Equal scores: the earlier pixel in raster order wins.
                    if other > c.score || (other == c.score && idx < own_idx) {
                        return false;
                    }
                }
            }
            true
        })
        .collect();

    kept.sort_by(corner_cmp_desc);
    kept.truncate(limit);
    kept
}

#[inline]
fn sample(image: &GrayImage, x: i32, y: i32) -> u8 {
    let (width, height) = image.dimensions();
    image.get_pixel(clamp_coord(x, width), clamp_coord(y, height))[0]
}

/// Orientation from the first-order moments of a disc around `(cx, cy)`.
fn intensity_centroid_angle(image: &GrayImage, cx: u32, cy: u32, radius: i32) -> f32 {
    let (cx, cy) = (cx as i32, cy as i32);
    let r2 = radius * radius;
    let mut m10 = 0i64;
    let mut m01 = 0i64;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let v = i64::from(sample(image, cx + dx, cy + dy));
            m10 += i64::from(dx) * v;
            m01 += i64::from(dy) * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

fn steered_brief(smoothed: &GrayImage, cx: u32, cy: u32, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let (cx, cy) = (cx as f32, cy as f32);
    let rotate = |x: i8, y: i8| -> (i32, i32) {
        let (x, y) = (f32::from(x), f32::from(y));
        (
            (cx + cos * x - sin * y).round() as i32,
            (cy + sin * x + cos * y).round() as i32,
        )
    };

    let mut descriptor = Descriptor::default();
    for (bit, pair) in brief_pattern().iter().enumerate() {
        let (x1, y1) = rotate(pair[0], pair[1]);
        let (x2, y2) = rotate(pair[2], pair[3]);
        if sample(smoothed, x1, y1) < sample(smoothed, x2, y2) {
            descriptor.set_bit(bit);
        }
    }
    descriptor
}
