//! Approximate nearest-neighbour search with bit-sampling LSH.
//!
//! Each table hashes a descriptor by a fixed random subset of its bits.
//! Queries gather candidates from their own bucket in every table (and, with
//! multi-probe, from buckets one key bit away), then rank the candidates by
//! exact Hamming distance. Candidates that never share a bucket are missed,
//! which is the approximation. When the probed buckets hold fewer than `k`
//! candidates the index scans linearly instead, so a lone exact hit still
//! comes with a runner-up for the ratio test.

use crate::features::{Descriptor, FeatureSet};
use crate::matching::brute::push_topk;
use crate::matching::{BruteForceIndex, KnnIndex, KnnSearch, Neighbor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

/// Builds [`LshIndex`]es.
#[derive(Clone, Debug)]
pub struct LshSearch {
    /// Number of hash tables.
    pub tables: usize,
    /// Sampled bits per key (clamped to 1..=24).
    pub key_bits: usize,
    /// Also probe buckets whose key differs in one bit.
    pub multi_probe: bool,
    /// Seed for bit selection.
    pub seed: u64,
}

impl Default for LshSearch {
    fn default() -> Self {
        Self {
            tables: 6,
            key_bits: 16,
            multi_probe: true,
            seed: 0x15_4A_11,
        }
    }
}

impl KnnSearch for LshSearch {
    fn build<'a>(&self, reference: &'a FeatureSet) -> Box<dyn KnnIndex + 'a> {
        Box::new(LshIndex::build(reference.descriptors(), self))
    }
}

struct LshTable {
    bits: Vec<usize>,
    buckets: HashMap<u32, Vec<u32>>,
}

impl LshTable {
    fn key(&self, d: &Descriptor) -> u32 {
        self.bits
            .iter()
            .enumerate()
            .fold(0u32, |key, (i, &bit)| if d.bit(bit) { key | (1 << i) } else { key })
    }
}

/// Multi-table LSH index over borrowed reference descriptors.
pub struct LshIndex<'a> {
    descriptors: &'a [Descriptor],
    tables: Vec<LshTable>,
    multi_probe: bool,
}

impl<'a> LshIndex<'a> {
    pub fn build(descriptors: &'a [Descriptor], params: &LshSearch) -> Self {
        let key_bits = params.key_bits.clamp(1, 24);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut tables = Vec::with_capacity(params.tables.max(1));
        for _ in 0..params.tables.max(1) {
            let bits = rand::seq::index::sample(&mut rng, Descriptor::BITS, key_bits).into_vec();
            let mut table = LshTable {
                bits,
                buckets: HashMap::new(),
            };
            for (idx, d) in descriptors.iter().enumerate() {
                let key = table.key(d);
                table.buckets.entry(key).or_default().push(idx as u32);
            }
            tables.push(table);
        }
        Self {
            descriptors,
            tables,
            multi_probe: params.multi_probe,
        }
    }

    fn candidates(&self, query: &Descriptor) -> Vec<u32> {
        let mut out = Vec::new();
        for table in &self.tables {
            let key = table.key(query);
            if let Some(bucket) = table.buckets.get(&key) {
                out.extend_from_slice(bucket);
            }
            if self.multi_probe {
                for i in 0..table.bits.len() {
                    if let Some(bucket) = table.buckets.get(&(key ^ (1 << i))) {
                        out.extend_from_slice(bucket);
                    }
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl KnnIndex for LshIndex<'_> {
    fn len(&self) -> usize {
        self.descriptors.len()
    }

    fn knn(&self, query: &Descriptor, k: usize) -> Vec<Neighbor> {
        let mut best = Vec::with_capacity(k + 1);
        if k == 0 {
            return best;
        }
        let candidates = self.candidates(query);
        if candidates.len() < k.min(self.descriptors.len()) {
            return BruteForceIndex::new(self.descriptors).knn(query, k);
        }
        for idx in candidates {
            let index = idx as usize;
            let candidate = Neighbor {
                index,
                distance: query.hamming(&self.descriptors[index]),
            };
            push_topk(&mut best, candidate, k);
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::{LshIndex, LshSearch};
    use crate::features::Descriptor;
    use crate::matching::{BruteForceIndex, KnnIndex};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_descriptors(n: usize, seed: u64) -> Vec<Descriptor> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Descriptor([rng.random(), rng.random(), rng.random(), rng.random()]))
            .collect()
    }

    fn flip(d: &Descriptor, bits: &[usize]) -> Descriptor {
        let mut out = *d;
        for &b in bits {
            out.0[b / 64] ^= 1 << (b % 64);
        }
        out
    }

    #[test]
    fn finds_near_duplicates() {
        let refs = random_descriptors(500, 1);
        let index = LshIndex::build(&refs, &LshSearch::default());
        let mut rng = StdRng::seed_from_u64(2);
        let mut hits = 0;
        for (i, d) in refs.iter().enumerate().step_by(5) {
            let bits: Vec<usize> = (0..3).map(|_| rng.random_range(0..256)).collect();
            let found = index.knn(&flip(d, &bits), 2);
            if found.first().map(|n| n.index) == Some(i) {
                hits += 1;
            }
        }
        assert!(hits >= 95, "recall too low: {hits}/100");
    }

    #[test]
    fn distances_are_exact_and_sorted() {
        let refs = random_descriptors(300, 9);
        let lsh = LshIndex::build(&refs, &LshSearch::default());
        let exact = BruteForceIndex::new(&refs);
        let query = flip(&refs[17], &[4, 77, 190]);
        let approx = lsh.knn(&query, 5);
        assert!(approx.windows(2).all(|w| w[0].distance <= w[1].distance));
        for n in &approx {
            assert_eq!(n.distance, query.hamming(&refs[n.index]));
        }
        assert_eq!(approx[0], exact.knn(&query, 1)[0]);
    }

    #[test]
    fn sparse_buckets_fall_back_to_scan() {
        let refs = random_descriptors(50, 3);
        let params = LshSearch {
            tables: 1,
            key_bits: 24,
            multi_probe: false,
            ..LshSearch::default()
        };
        let index = LshIndex::build(&refs, &params);
        let found = index.knn(&refs[10], 2);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].index, 10);
        assert_eq!(found, BruteForceIndex::new(&refs).knn(&refs[10], 2));
    }
}
