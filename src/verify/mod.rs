//! Geometric verification of correspondences with a RANSAC homography.
//!
//! Homographies map icon coordinates into search-image coordinates. Fitting
//! uses the normalized DLT on minimal 4-point samples, scores each model by
//! the number of correspondences within the reprojection threshold, adapts
//! the iteration count to the observed inlier ratio, and refits the winner on
//! all of its inliers. With [`RansacConfig::check_outline`] set, a model is
//! additionally required to map the icon rectangle to a convex, non-mirrored
//! quadrilateral of plausible size; four chance correspondences always admit
//! an exact homography, and the check rejects most of them.

use crate::features::FeatureSet;
use crate::matching::Correspondence;
use crate::trace::trace_event;
use crate::util::math::{cross2, has_collinear_triple};
use crate::util::IconFailure;
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Minimum correspondences for a planar homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Samples whose triangles are thinner than this (twice the area, px^2) are skipped.
const DEGENERATE_AREA: f64 = 1.0;


/// Integer pixel location in the search image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// RANSAC parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Inlier threshold on reprojection error, in search-image pixels.
    pub reproj_threshold: f64,
    /// Upper bound on sampled hypotheses.
    pub max_iters: usize,
    /// Desired probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// Seed for hypothesis sampling.
    pub seed: u64,
    /// Models with fewer inliers are rejected.
    pub min_inliers: usize,
    /// Reject models whose projected icon outline is not a convex quad with
    /// the icon's winding and an area within `max_area_ratio` of the icon's.
    pub check_outline: bool,
    /// Largest accepted scale change of the outline area, either way.
    pub max_area_ratio: f64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            reproj_threshold: 5.0,
            max_iters: 2000,
            confidence: 0.995,
            seed: 0x5EED,
            min_inliers: MIN_CORRESPONDENCES,
            check_outline: false,
            max_area_ratio: 64.0,
        }
    }
}

/// A 3x3 projective transform normalized so that `h[(2, 2)] == 1` when possible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn from_matrix(m: Matrix3<f64>) -> Self {
        Self(m)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Maps a point; `None` if it lands on the line at infinity.
    pub fn project(&self, p: [f64; 2]) -> Option<[f64; 2]> {
        let v = self.0 * Vector3::new(p[0], p[1], 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        Some([v[0] / v[2], v[1] / v[2]])
    }

    /// Euclidean reprojection error of `src -> dst`; infinite when unprojectable.
    pub fn reprojection_error(&self, src: [f64; 2], dst: [f64; 2]) -> f64 {
        match self.project(src) {
            Some(p) => ((p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2)).sqrt(),
            None => f64::INFINITY,
        }
    }

    /// Direct linear transform over at least four point pairs.
    pub fn estimate(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Self> {
        let n = src.len();
        if n < MIN_CORRESPONDENCES || dst.len() != n {
            return None;
        }
        let (t_src, src_n) = normalize_points(src);
        let (t_dst, dst_n) = normalize_points(dst);

        let mut a = DMatrix::<f64>::zeros(2 * n, 9);
        for i in 0..n {
            let [sx, sy] = src_n[i];
            let [dx, dy] = dst_n[i];
            let r = 2 * i;
            a[(r, 3)] = -sx;
            a[(r, 4)] = -sy;
            a[(r, 5)] = -1.0;
            a[(r, 6)] = dy * sx;
            a[(r, 7)] = dy * sy;
            a[(r, 8)] = dy;
            a[(r + 1, 0)] = sx;
            a[(r + 1, 1)] = sy;
            a[(r + 1, 2)] = 1.0;
            a[(r + 1, 6)] = -dx * sx;
            a[(r + 1, 7)] = -dx * sy;
            a[(r + 1, 8)] = -dx;
        }

        // Null vector of A is the eigenvector of A^T A with the smallest eigenvalue.
        let eig = SymmetricEigen::new(a.transpose() * &a);
        let min_idx = eig
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))
            .map(|(i, _)| i)?;
        let h = eig.eigenvectors.column(min_idx);
        let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let m = t_dst.try_inverse()? * h_norm * t_src;
        let m = if m[(2, 2)].abs() > 1e-12 {
            m / m[(2, 2)]
        } else {
            m
        };
        if !m.iter().all(|v| v.is_finite()) || m.determinant().abs() < 1e-12 {
            return None;
        }
        Some(Self(m))
    }
}

/// Translates the centroid to the origin and scales mean distance to sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();
    (t, normalized)
}

/// Iterations needed to hit `confidence` at the given inlier ratio.
fn required_iterations(confidence: f64, inlier_ratio: f64, max_iters: usize) -> usize {
    let w4 = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
    if w4 >= 1.0 - f64::EPSILON {
        return 1;
    }
    if w4 <= f64::EPSILON {
        return max_iters;
    }
    let confidence = confidence.clamp(0.0, 1.0 - 1e-12);
    let needed = (1.0 - confidence).ln() / (1.0 - w4).ln();
    if needed.is_finite() {
        (needed.ceil() as usize).clamp(1, max_iters)
    } else {
        max_iters
    }
}

fn inlier_mask(h: &Homography, src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| h.reprojection_error(*s, *d) <= threshold)
        .collect()
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}

/// Fits a homography robustly. Returns the model and its inlier mask.
pub fn fit_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    cfg: &RansacConfig,
) -> Option<(Homography, Vec<bool>)> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() != n {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut best: Option<(Homography, Vec<bool>, usize)> = None;
    let mut iters_needed = cfg.max_iters.max(1);
    let mut iter = 0;

    while iter < iters_needed {
        iter += 1;
        let idx = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let mut s4 = [[0.0; 2]; 4];
        let mut d4 = [[0.0; 2]; 4];
        for (k, i) in idx.iter().enumerate() {
            s4[k] = src[i];
            d4[k] = dst[i];
        }
        if has_collinear_triple(&s4, DEGENERATE_AREA) || has_collinear_triple(&d4, DEGENERATE_AREA)
        {
            continue;
        }
        let Some(h) = Homography::estimate(&s4, &d4) else {
            continue;
        };
        let mask = inlier_mask(&h, src, dst, cfg.reproj_threshold);
        let inliers = count(&mask);
        if best.as_ref().map_or(true, |b| inliers > b.2) {
            let ratio = inliers as f64 / n as f64;
            iters_needed = required_iterations(cfg.confidence, ratio, cfg.max_iters.max(1));
            best = Some((h, mask, inliers));
        }
    }

    let (h, mask, inliers) = best?;
    if inliers < cfg.min_inliers.max(MIN_CORRESPONDENCES) {
        return None;
    }

    let (in_src, in_dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = src
        .iter()
        .zip(dst)
        .zip(&mask)
        .filter(|(_, &m)| m)
        .map(|((s, d), _)| (*s, *d))
        .unzip();
    if let Some(refit) = Homography::estimate(&in_src, &in_dst) {
        let refit_mask = inlier_mask(&refit, src, dst, cfg.reproj_threshold);
        if count(&refit_mask) >= inliers {
            return Some((refit, refit_mask));
        }
    }
    Some((h, mask))
}

/// Outcome of verifying one icon against the search image.
#[derive(Clone, Debug)]
pub struct Verification {
    pub homography: Homography,
    /// Parallel to the input correspondences.
    pub inlier_mask: Vec<bool>,
    /// Search-image locations of inlier correspondences, in correspondence order.
    pub points: Vec<Point>,
    /// Icon corners projected into the search image (clockwise from top-left);
    /// `None` if a corner maps to infinity.
    pub outline: Option<[[f64; 2]; 4]>,
}

impl Verification {
    pub fn inliers(&self) -> usize {
        count(&self.inlier_mask)
    }
}

/// True if `outline` is a convex quad with the same winding as the icon
/// rectangle and an area within `max_ratio` of `icon_area` in either direction.
fn plausible_outline(outline: &[[f64; 2]; 4], icon_area: f64, max_ratio: f64) -> bool {
    let convex =
        (0..4).all(|i| cross2(outline[i], outline[(i + 1) % 4], outline[(i + 2) % 4]) > 0.0);
    if !convex {
        return false;
    }
    let area = 0.5
        * (cross2(outline[0], outline[1], outline[2]) + cross2(outline[0], outline[2], outline[3]));
    let ratio = area / icon_area.max(1.0);
    let max_ratio = max_ratio.max(1.0);
    (1.0 / max_ratio..=max_ratio).contains(&ratio)
}

/// Verifies correspondences from icon (`query`) to search image (`reference`).
pub fn verify(
    icon_size: (u32, u32),
    query: &FeatureSet,
    reference: &FeatureSet,
    correspondences: &[Correspondence],
    cfg: &RansacConfig,
) -> Result<Verification, IconFailure> {
    if correspondences.len() < MIN_CORRESPONDENCES {
        return Err(IconFailure::InsufficientCorrespondences {
            needed: MIN_CORRESPONDENCES,
            found: correspondences.len(),
        });
    }
    let qk = query.keypoints();
    let rk = reference.keypoints();
    let mut src = Vec::with_capacity(correspondences.len());
    let mut dst = Vec::with_capacity(correspondences.len());
    for c in correspondences {
        let (Some(q), Some(r)) = (qk.get(c.query_idx), rk.get(c.reference_idx)) else {
            return Err(IconFailure::InvalidCorrespondence {
                query_idx: c.query_idx,
                reference_idx: c.reference_idx,
            });
        };
        src.push([f64::from(q.x), f64::from(q.y)]);
        dst.push([f64::from(r.x), f64::from(r.y)]);
    }

    let (homography, inlier_mask) =
        fit_ransac(&src, &dst, cfg).ok_or(IconFailure::DegenerateHomography)?;

    let (w, h) = (
        f64::from(icon_size.0.saturating_sub(1)),
        f64::from(icon_size.1.saturating_sub(1)),
    );
    let corners = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]];
    let outline = match corners.map(|c| homography.project(c)) {
        [Some(a), Some(b), Some(c), Some(d)] => Some([a, b, c, d]),
        _ => None,
    };
    if cfg.check_outline
        && !outline.is_some_and(|o| plausible_outline(&o, w * h, cfg.max_area_ratio))
    {
        return Err(IconFailure::DegenerateHomography);
    }

    let points = dst
        .iter()
        .zip(&inlier_mask)
        .filter(|(_, &m)| m)
        .map(|(d, _)| Point::new(d[0] as i32, d[1] as i32))
        .collect();

    let verification = Verification {
        homography,
        inlier_mask,
        points,
        outline,
    };
    trace_event!(
        "homography",
        correspondences = correspondences.len(),
        inliers = verification.inliers()
    );
    Ok(verification)
}
