//! Descriptor correspondence search.
//!
//! Nearest-neighbour lookup is an injected capability: a [`KnnSearch`] builds
//! a [`KnnIndex`] over a reference feature set, and the matcher only asks the
//! index for the `k` closest descriptors of each query. Exact brute force and
//! approximate LSH backends are provided; [`AutoSearch`] picks between them by
//! reference size.

use crate::features::{Descriptor, FeatureSet};
use serde::{Deserialize, Serialize};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

mod brute;
mod lsh;

pub use brute::{BruteForceIndex, BruteForceSearch};
pub use lsh::{LshIndex, LshSearch};

/// One neighbour returned by an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighbor {
    /// Index into the reference feature set.
    pub index: usize,
    /// Hamming distance to the query.
    pub distance: u32,
}

/// A query-to-reference feature pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Correspondence {
    /// Index into the query (icon) feature set.
    pub query_idx: usize,
    /// Index into the reference (search image) feature set.
    pub reference_idx: usize,
    /// Distance to the best reference descriptor.
    pub distance: u32,
    /// Distance to the runner-up, if the index returned one.
    pub second_distance: Option<u32>,
}

/// k-nearest-neighbour lookup over a fixed reference set.
pub trait KnnIndex: Sync {
    /// Number of indexed reference descriptors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns up to `k` neighbours sorted by ascending distance.
    fn knn(&self, query: &Descriptor, k: usize) -> Vec<Neighbor>;
}

/// Builds a [`KnnIndex`] for a reference feature set.
pub trait KnnSearch: Send + Sync {
    fn build<'a>(&self, reference: &'a FeatureSet) -> Box<dyn KnnIndex + 'a>;
}

/// Picks brute force for small reference sets and LSH for large ones.
#[derive(Clone, Debug)]
pub struct AutoSearch {
    /// Reference sets smaller than this use exact search.
    pub brute_force_below: usize,
    pub lsh: LshSearch,
}

impl Default for AutoSearch {
    fn default() -> Self {
        Self {
            brute_force_below: 2000,
            lsh: LshSearch::default(),
        }
    }
}

impl KnnSearch for AutoSearch {
    fn build<'a>(&self, reference: &'a FeatureSet) -> Box<dyn KnnIndex + 'a> {
        if reference.len() < self.brute_force_below {
            BruteForceSearch.build(reference)
        } else {
            self.lsh.build(reference)
        }
    }
}

/// Serializable choice of nearest-neighbour backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnnBackend {
    Auto { brute_force_below: usize },
    BruteForce,
    Lsh {
        tables: usize,
        key_bits: usize,
        multi_probe: bool,
    },
}

impl Default for KnnBackend {
    fn default() -> Self {
        KnnBackend::Auto {
            brute_force_below: AutoSearch::default().brute_force_below,
        }
    }
}

impl KnnBackend {
    /// Instantiates the backend.
    pub fn build_search(&self) -> Box<dyn KnnSearch> {
        match *self {
            KnnBackend::Auto { brute_force_below } => Box::new(AutoSearch {
                brute_force_below,
                lsh: LshSearch::default(),
            }),
            KnnBackend::BruteForce => Box::new(BruteForceSearch),
            KnnBackend::Lsh {
                tables,
                key_bits,
                multi_probe,
            } => Box::new(LshSearch {
                tables,
                key_bits,
                multi_probe,
                ..LshSearch::default()
            }),
        }
    }
}

/// Matching parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Lowe ratio; `None` keeps every best match.
    pub ratio: Option<f32>,
    pub backend: KnnBackend,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ratio: Some(0.7),
            backend: KnnBackend::default(),
        }
    }
}

fn correspond(
    query_idx: usize,
    descriptor: &Descriptor,
    index: &dyn KnnIndex,
    ratio: Option<f32>,
) -> Option<Correspondence> {
    let neighbors = index.knn(descriptor, 2);
    let best = *neighbors.first()?;
    let second = neighbors.get(1).map(|n| n.distance);
    if let Some(ratio) = ratio {
        let second = second?;
        if (best.distance as f32) >= ratio * second as f32 {
            return None;
        }
    }
    Some(Correspondence {
        query_idx,
        reference_idx: best.index,
        distance: best.distance,
        second_distance: second,
    })
}

/// Matches every query descriptor against an index, applying the ratio test.
///
/// Output follows query order. With a ratio, queries that get fewer than two
/// neighbours are dropped.
pub fn match_features(
    query: &FeatureSet,
    index: &dyn KnnIndex,
    ratio: Option<f32>,
) -> Vec<Correspondence> {
    if query.is_empty() || index.is_empty() {
        return Vec::new();
    }
    let descriptors = query.descriptors();

    #[cfg(feature = "rayon")]
    let matches: Vec<Correspondence> = descriptors
        .par_iter()
        .enumerate()
        .filter_map(|(idx, d)| correspond(idx, d, index, ratio))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let matches: Vec<Correspondence> = descriptors
        .iter()
        .enumerate()
        .filter_map(|(idx, d)| correspond(idx, d, index, ratio))
        .collect();

    matches
}

/// Builds an index over `reference` and matches `query` against it.
pub fn match_sets(
    query: &FeatureSet,
    reference: &FeatureSet,
    search: &dyn KnnSearch,
    ratio: Option<f32>,
) -> Vec<Correspondence> {
    if query.is_empty() || reference.is_empty() {
        return Vec::new();
    }
    let index = search.build(reference);
    match_features(query, index.as_ref(), ratio)
}
