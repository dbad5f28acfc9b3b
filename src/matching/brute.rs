//! Exact nearest-neighbour search by linear scan.

use crate::features::{Descriptor, FeatureSet};
use crate::matching::{KnnIndex, KnnSearch, Neighbor};

/// Builds [`BruteForceIndex`]es.
#[derive(Clone, Copy, Debug, Default)]
pub struct BruteForceSearch;

impl KnnSearch for BruteForceSearch {
    fn build<'a>(&self, reference: &'a FeatureSet) -> Box<dyn KnnIndex + 'a> {
        Box::new(BruteForceIndex::new(reference.descriptors()))
    }
}

/// Linear scan over borrowed reference descriptors.
pub struct BruteForceIndex<'a> {
    descriptors: &'a [Descriptor],
}

impl<'a> BruteForceIndex<'a> {
    pub fn new(descriptors: &'a [Descriptor]) -> Self {
        Self { descriptors }
    }
}

/// Inserts into a sorted top-`k` list; ties keep the lower reference index.
pub(crate) fn push_topk(best: &mut Vec<Neighbor>, candidate: Neighbor, k: usize) {
    if best.len() == k {
        match best.last() {
            Some(worst) if candidate.distance < worst.distance => {
                best.pop();
            }
            _ => return,
        }
    }
    let pos = best
        .iter()
        .position(|n| {
            candidate.distance < n.distance
                || (candidate.distance == n.distance && candidate.index < n.index)
        })
        .unwrap_or(best.len());
    best.insert(pos, candidate);
}

impl KnnIndex for BruteForceIndex<'_> {
    fn len(&self) -> usize {
        self.descriptors.len()
    }

    fn knn(&self, query: &Descriptor, k: usize) -> Vec<Neighbor> {
        let mut best = Vec::with_capacity(k + 1);
        if k == 0 {
            return best;
        }
        for (index, d) in self.descriptors.iter().enumerate() {
            let candidate = Neighbor {
                index,
                distance: query.hamming(d),
            };
            push_topk(&mut best, candidate, k);
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::BruteForceIndex;
    use crate::features::Descriptor;
    use crate::matching::{KnnIndex, Neighbor};

    #[test]
    fn knn_returns_sorted_closest() {
        let refs = [
            Descriptor([0b111, 0, 0, 0]),
            Descriptor([0b1, 0, 0, 0]),
            Descriptor([u64::MAX, 0, 0, 0]),
            Descriptor([0b11, 0, 0, 0]),
        ];
        let index = BruteForceIndex::new(&refs);
        let found = index.knn(&Descriptor::default(), 2);
        assert_eq!(
            found,
            vec![
                Neighbor { index: 1, distance: 1 },
                Neighbor { index: 3, distance: 2 },
            ]
        );
        assert_eq!(index.knn(&Descriptor::default(), 10).len(), 4);
        assert!(index.knn(&Descriptor::default(), 0).is_empty());
    }

    #[test]
    fn ties_prefer_lower_index() {
        let refs = [Descriptor([1, 0, 0, 0]), Descriptor([2, 0, 0, 0]), Descriptor([4, 0, 0, 0])];
        let index = BruteForceIndex::new(&refs);
        let found = index.knn(&Descriptor::default(), 2);
        assert_eq!(found[0].index, 0);
        assert_eq!(found[1].index, 1);
    }
}
