#![cfg(feature = "rayon")]

use iconmatch::features::pyramid::ScalePyramid;
use iconmatch::matching::BruteForceIndex;
use iconmatch::{
    match_features, Correspondence, FeatureConfig, FeatureExtractor, KnnIndex, OrbExtractor,
    RasterImage,
};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn make_scene(width: u32, height: u32, seed: u64) -> RasterImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = (((x / 5) * 37 + (y / 5) * 91) % 256) as u8 ^ rng.random_range(0..16u8);
        Rgb([v, v, v])
    });
    RasterImage::from_rgb(img).unwrap()
}

#[test]
fn parallel_matching_preserves_query_order() {
    let extractor = OrbExtractor::new(FeatureConfig::default());
    let scene = make_scene(200, 160, 4);
    let features = extractor.extract(&scene);
    let index = BruteForceIndex::new(features.descriptors());

    let parallel = match_features(&features, &index, None);

    // Sequential reference: best neighbour of every query, in order.
    let sequential: Vec<Correspondence> = features
        .descriptors()
        .iter()
        .enumerate()
        .map(|(query_idx, d)| {
            let nn = index.knn(d, 2);
            Correspondence {
                query_idx,
                reference_idx: nn[0].index,
                distance: nn[0].distance,
                second_distance: nn.get(1).map(|n| n.distance),
            }
        })
        .collect();
    assert_eq!(parallel, sequential);
    assert!(parallel.iter().all(|c| c.distance == 0));
}

#[test]
fn parallel_extraction_is_level_ordered() {
    let extractor = OrbExtractor::new(FeatureConfig::default());
    let scene = make_scene(180, 140, 8);
    let a = extractor.extract(&scene);
    let b = extractor.extract(&scene);
    assert_eq!(a.keypoints(), b.keypoints());
    assert_eq!(a.descriptors(), b.descriptors());

    let octaves: Vec<u8> = a.keypoints().iter().map(|k| k.octave).collect();
    assert!(octaves.windows(2).all(|w| w[0] <= w[1]));
    let levels = ScalePyramid::build(&scene.to_gray(), 6, 1.2, false).len();
    assert!(octaves.iter().all(|&o| (o as usize) < levels));
}
