use criterion::{criterion_group, criterion_main, Criterion};
use iconmatch::image::codec;
use iconmatch::matching::LshIndex;
use iconmatch::{
    match_features, BruteForceSearch, FeatureConfig, FeatureExtractor, KnnSearch, LshSearch,
    OrbExtractor, RasterImage, Solver,
};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn make_icon(seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut icon = RgbImage::new(36, 36);
    for by in (0..36).step_by(6) {
        for bx in (0..36).step_by(6) {
            let v = rng.random_range(0..=4u8) * 50;
            draw_filled_rect_mut(&mut icon, Rect::at(bx, by).of_size(6, 6), Rgb([v, v, v]));
        }
    }
    icon
}

fn compose(width: u32, height: u32, icons: &[(&RgbImage, i64, i64)]) -> RasterImage {
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for &(icon, x, y) in icons {
        image::imageops::replace(&mut canvas, icon, x, y);
    }
    RasterImage::from_rgb(canvas).unwrap()
}

fn bench_pipeline(c: &mut Criterion) {
    let icons: Vec<RgbImage> = (0..3).map(make_icon).collect();
    let target = compose(
        200,
        60,
        &[(&icons[0], 10, 12), (&icons[1], 80, 12), (&icons[2], 150, 12)],
    );
    let scene = compose(
        340,
        220,
        &[(&icons[2], 30, 40), (&icons[0], 150, 130), (&icons[1], 260, 60)],
    );

    let extractor = OrbExtractor::new(FeatureConfig::default());
    c.bench_function("orb_extract_scene", |b| {
        b.iter(|| black_box(extractor.extract(&scene)));
    });

    let scene_features = extractor.extract(&scene);
    let icon_features = extractor.extract(&compose(40, 40, &[(&icons[0], 2, 2)]));

    let brute = BruteForceSearch.build(&scene_features);
    c.bench_function("match_brute_force", |b| {
        b.iter(|| black_box(match_features(&icon_features, brute.as_ref(), Some(0.7))));
    });

    let lsh = LshIndex::build(scene_features.descriptors(), &LshSearch::default());
    c.bench_function("match_lsh", |b| {
        b.iter(|| black_box(match_features(&icon_features, &lsh, Some(0.7))));
    });

    let solver = Solver::default();
    c.bench_function("locate_three_icons", |b| {
        b.iter(|| black_box(solver.locate(&target, &scene)));
    });

    let target_payload = codec::encode_png_base64(&target).unwrap();
    let scene_payload = codec::encode_png_base64(&scene).unwrap();
    c.bench_function("crack_captcha_base64", |b| {
        b.iter(|| black_box(solver.crack_captcha(&target_payload, &scene_payload)));
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
