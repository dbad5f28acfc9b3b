//! Greedy box suppression of clustered click points.

use crate::verify::Point;
use serde::{Deserialize, Serialize};

/// Deduplication parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Points closer than this on both axes collapse into the first one seen.
    pub window: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { window: 10 }
    }
}

/// Keeps points in input order, dropping any point that falls strictly
/// within `window` on both axes of an already kept point.
///
/// A `window` of zero keeps everything.
pub fn dedupe_points(points: &[Point], window: u32) -> Vec<Point> {
    if window == 0 {
        return points.to_vec();
    }
    let window = i64::from(window);
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());

    'outer: for p in points.iter().copied() {
        for k in kept.iter() {
            let dx = (i64::from(p.x) - i64::from(k.x)).abs();
            let dy = (i64::from(p.y) - i64::from(k.y)).abs();
            if dx < window && dy < window {
                continue 'outer;
            }
        }
        kept.push(p);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::dedupe_points;
    use crate::verify::Point;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pts(raw: &[(i32, i32)]) -> Vec<Point> {
        raw.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn first_seen_wins() {
        let out = dedupe_points(&pts(&[(100, 100), (105, 103), (95, 91), (130, 100)]), 10);
        assert_eq!(out, pts(&[(100, 100), (130, 100)]));
    }

    #[test]
    fn window_is_exclusive_per_axis() {
        // Exactly 10 apart on x is far enough even with identical y.
        let out = dedupe_points(&pts(&[(0, 0), (10, 0), (9, 9), (3, 12)]), 10);
        assert_eq!(out, pts(&[(0, 0), (10, 0), (3, 12)]));
    }

    #[test]
    fn zero_window_keeps_everything() {
        let input = pts(&[(1, 1), (1, 1), (2, 2)]);
        assert_eq!(dedupe_points(&input, 0), input);
        assert!(dedupe_points(&[], 10).is_empty());
    }

    #[test]
    fn survivors_are_pairwise_separated() {
        let mut rng = StdRng::seed_from_u64(7);
        let input: Vec<Point> = (0..400)
            .map(|_| Point::new(rng.random_range(0..120), rng.random_range(0..80)))
            .collect();
        let out = dedupe_points(&input, 10);
        assert!(!out.is_empty());
        for (i, a) in out.iter().enumerate() {
            for b in &out[i + 1..] {
                assert!((a.x - b.x).abs() >= 10 || (a.y - b.y).abs() >= 10);
            }
        }
        // Every dropped point is covered by a survivor.
        for p in &input {
            assert!(out
                .iter()
                .any(|k| (p.x - k.x).abs() < 10 && (p.y - k.y).abs() < 10));
        }
    }
}
