//! End-to-end icon location.
//!
//! [`Solver`] decodes both payloads, segments the target into icons, then
//! locates each icon in the search image in left-to-right order: features,
//! ratio-tested matches, RANSAC verification, and point deduplication. Only
//! decode failures and an empty segmentation end a run early; anything that
//! goes wrong for a single icon is recorded in its [`IconReport`] and the
//! run moves on to the next icon.

use crate::dedup::{dedupe_points, DedupConfig};
use crate::features::{FeatureConfig, FeatureExtractor, FeatureSet, OrbExtractor};
use crate::image::{codec, RasterImage};
use crate::matching::{match_features, KnnIndex, KnnSearch, MatchConfig};
use crate::segment::{segment, IconRegion, SegmentConfig};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{FeatureSide, IconFailure};
use crate::verify::{verify, RansacConfig, Verification};
use serde::{Deserialize, Serialize};

mod debug;
mod result;

pub use debug::{render_match, render_result, DebugArtifact, DebugSink, DirectorySink};
pub use result::{ClickPoint, IconOutcome, IconReport, ImageRole, SolveFailure, SolveResult};

/// All solver parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub segment: SegmentConfig,
    pub features: FeatureConfig,
    pub matching: MatchConfig,
    pub ransac: RansacConfig,
    pub dedup: DedupConfig,
}

/// Locates target icons inside a search image.
///
/// A solver holds no per-run state, so one instance can serve concurrent
/// calls from several threads.
pub struct Solver {
    config: SolverConfig,
    extractor: Box<dyn FeatureExtractor>,
    search: Box<dyn KnnSearch>,
    debug: Option<Box<dyn DebugSink>>,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl Solver {
    /// Builds a solver with the ORB extractor and the configured kNN backend.
    pub fn new(config: SolverConfig) -> Self {
        let extractor = Box::new(OrbExtractor::new(config.features.clone()));
        let search = config.matching.backend.build_search();
        Self {
            config,
            extractor,
            search,
            debug: None,
        }
    }

    /// Replaces the nearest-neighbour backend.
    pub fn with_search(mut self, search: Box<dyn KnnSearch>) -> Self {
        self.search = search;
        self
    }

    /// Replaces the feature extractor.
    pub fn with_extractor(mut self, extractor: Box<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Sends intermediate images to `sink`.
    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug = Some(sink);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solves from two text payloads (base64, optionally with a data-URI prefix).
    ///
    /// Always returns a result; failures are reported through
    /// [`SolveResult::success`] and [`SolveResult::message`].
    pub fn crack_captcha(&self, target: &str, search: &str) -> SolveResult {
        let _span = trace_span!("crack_captcha").entered();
        let target = match codec::decode(target) {
            Ok(img) => img,
            Err(source) => {
                return self.fail(SolveFailure::Decode {
                    which: ImageRole::Target,
                    source,
                })
            }
        };
        let search = match codec::decode(search) {
            Ok(img) => img,
            Err(source) => {
                return self.fail(SolveFailure::Decode {
                    which: ImageRole::Search,
                    source,
                })
            }
        };
        self.locate(&target, &search)
    }

    /// Solves from already decoded images.
    pub fn locate(&self, target: &RasterImage, search: &RasterImage) -> SolveResult {
        let regions = match segment(target, &self.config.segment) {
            Ok(regions) => regions,
            Err(err) => {
                let reason = err.to_string();
                trace_warn!("segment_failed", reason = reason.as_str());
                Vec::new()
            }
        };
        if regions.is_empty() {
            return self.fail(SolveFailure::NoIconsExtracted);
        }

        let search_features = self.extractor.extract(search);
        let index = self.search.build(&search_features);

        let mut points = Vec::new();
        let mut reports = Vec::with_capacity(regions.len());
        for region in &regions {
            self.emit(&DebugArtifact::IconCrop {
                index: region.index,
                image: &region.image,
            });

            let outcome = match self.locate_icon(region, &search_features, index.as_ref()) {
                Ok(verification) => {
                    let located =
                        dedupe_points(&verification.points, self.config.dedup.window);
                    self.emit(&DebugArtifact::IconMatch {
                        index: region.index,
                        search,
                        points: &located,
                        outline: verification.outline,
                    });
                    trace_event!("icon_located", icon = region.index, points = located.len());
                    IconOutcome::Located {
                        inliers: verification.inliers(),
                        points: located,
                    }
                }
                Err(failure) => {
                    let reason = failure.to_string();
                    trace_warn!("icon_failed", icon = region.index, reason = reason.as_str());
                    IconOutcome::Failed(failure)
                }
            };

            points.extend(outcome.points().iter().map(|p| ClickPoint {
                x: p.x,
                y: p.y,
                icon: region.index,
            }));
            reports.push(IconReport {
                index: region.index,
                bbox: region.bbox,
                outcome,
            });
        }

        let debug_image = self.emit(&DebugArtifact::Result {
            search,
            points: &points,
        });
        let result = SolveResult::finished(points, reports, debug_image);
        trace_event!("solved", points = result.points.len(), success = result.success);
        result
    }

    fn locate_icon(
        &self,
        region: &IconRegion,
        search_features: &FeatureSet,
        index: &dyn KnnIndex,
    ) -> Result<Verification, IconFailure> {
        let _span = trace_span!("match_icon", icon = region.index).entered();
        let icon_features = self.extractor.extract(&region.image);
        if icon_features.is_empty() {
            return Err(IconFailure::NoFeatures {
                side: FeatureSide::Icon,
            });
        }
        if search_features.is_empty() {
            return Err(IconFailure::NoFeatures {
                side: FeatureSide::Search,
            });
        }

        let matches = match_features(&icon_features, index, self.config.matching.ratio);
        trace_event!(
            "matches",
            icon_features = icon_features.len(),
            correspondences = matches.len()
        );
        verify(
            region.image.dimensions(),
            &icon_features,
            search_features,
            &matches,
            &self.config.ransac,
        )
    }

    fn fail(&self, failure: SolveFailure) -> SolveResult {
        let reason = failure.to_string();
        trace_warn!("solve_failed", reason = reason.as_str());
        SolveResult::failed(&failure)
    }

    /// Forwards an artifact to the sink, if any; sink errors are dropped.
    fn emit(&self, artifact: &DebugArtifact<'_>) -> Option<String> {
        let sink = self.debug.as_ref()?;
        match sink.record(artifact) {
            Ok(location) => location,
            Err(err) => {
                let reason = err.to_string();
                trace_warn!("debug_sink_failed", reason = reason.as_str());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DebugArtifact, DebugSink, Solver, SolverConfig};
    use crate::features::{Descriptor, FeatureExtractor, FeatureSet, Keypoint};
    use crate::image::{codec, RasterImage};
    use crate::matching::{BruteForceSearch, KnnIndex, KnnSearch, Neighbor};
    use crate::pipeline::IconOutcome;
    use crate::util::{FeatureSide, IconFailure, IconMatchError, IconMatchResult};
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::sync::{Arc, Mutex};

    /// Reports no features for anything.
    struct Blind;

    impl FeatureExtractor for Blind {
        fn extract(&self, _image: &RasterImage) -> FeatureSet {
            FeatureSet::default()
        }
    }

    /// Same feature set for every image: four exact matches per icon.
    struct Fixed;

    impl FeatureExtractor for Fixed {
        fn extract(&self, _image: &RasterImage) -> FeatureSet {
            let corners = [(2.0, 2.0), (20.0, 3.0), (21.0, 19.0), (3.0, 18.0)];
            FeatureSet::from_pairs(corners.iter().enumerate().map(|(i, &(x, y))| {
                (
                    Keypoint {
                        x,
                        y,
                        size: 31.0,
                        angle: 0.0,
                        response: 1.0,
                        octave: 0,
                    },
                    Descriptor([u64::MAX >> (i * 16), 0, 0, 0]),
                )
            }))
        }
    }

    /// An index that answers with reference features that do not exist.
    struct Dangling;

    impl KnnIndex for Dangling {
        fn len(&self) -> usize {
            1
        }

        fn knn(&self, _query: &Descriptor, _k: usize) -> Vec<Neighbor> {
            vec![
                Neighbor {
                    index: 999,
                    distance: 0,
                },
                Neighbor {
                    index: 1000,
                    distance: 50,
                },
            ]
        }
    }

    impl KnnSearch for Dangling {
        fn build<'a>(&self, _reference: &'a FeatureSet) -> Box<dyn KnnIndex + 'a> {
            Box::new(Dangling)
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        names: Arc<Mutex<Vec<String>>>,
    }

    impl DebugSink for Recorder {
        fn record(&self, artifact: &DebugArtifact<'_>) -> IconMatchResult<Option<String>> {
            let name = artifact.name();
            if let Ok(mut names) = self.names.lock() {
                names.push(name.clone());
            }
            Ok(Some(name))
        }
    }

    struct Broken;

    impl DebugSink for Broken {
        fn record(&self, _artifact: &DebugArtifact<'_>) -> IconMatchResult<Option<String>> {
            Err(IconMatchError::Encode {
                reason: "sink offline".to_string(),
            })
        }
    }

    fn two_squares() -> RasterImage {
        let mut img = RgbImage::from_pixel(80, 30, Rgb([255, 255, 255]));
        draw_filled_rect_mut(&mut img, Rect::at(5, 5).of_size(20, 20), Rgb([0, 0, 0]));
        draw_filled_rect_mut(&mut img, Rect::at(50, 5).of_size(20, 20), Rgb([0, 0, 0]));
        RasterImage::from_rgb(img).unwrap()
    }

    fn blank(width: u32, height: u32) -> RasterImage {
        RasterImage::from_rgb(RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))).unwrap()
    }

    #[test]
    fn decode_failure_names_the_payload() {
        let solver = Solver::default();
        let good = codec::encode_png_base64(&blank(10, 10)).unwrap();
        let result = solver.crack_captcha(&good, "%%%");
        assert!(!result.success);
        assert!(result.points.is_empty());
        assert!(result.message.starts_with("image decode failed (search)"));
        let result = solver.crack_captcha("data:image/png;base64,", &good);
        assert!(result.message.starts_with("image decode failed (target)"));
    }

    #[test]
    fn blank_target_extracts_no_icons() {
        let result = Solver::default().locate(&blank(50, 50), &blank(50, 50));
        assert!(!result.success);
        assert_eq!(result.message, "no target icons extracted");
        assert!(result.icons.is_empty());
    }

    #[test]
    fn featureless_icons_fail_individually() {
        let solver = Solver::default().with_extractor(Box::new(Blind));
        let result = solver.locate(&two_squares(), &blank(100, 100));
        assert!(!result.success);
        assert_eq!(result.message, "found 0 click points");
        assert_eq!(result.icons.len(), 2);
        for report in &result.icons {
            assert_eq!(
                report.outcome,
                IconOutcome::Failed(IconFailure::NoFeatures {
                    side: FeatureSide::Icon
                })
            );
        }
    }

    #[test]
    fn points_are_tagged_and_deduplicated_per_icon() {
        let mut config = SolverConfig::default();
        config.matching.ratio = None;
        let solver = Solver::new(config)
            .with_extractor(Box::new(Fixed))
            .with_search(Box::new(BruteForceSearch));
        let result = solver.locate(&two_squares(), &blank(100, 100));
        assert!(result.success);
        // Four separated corners per icon survive; no cross-icon dedup.
        assert_eq!(result.points.len(), 8);
        assert_eq!(result.points_for(0).count(), 4);
        assert_eq!(result.points_for(1).count(), 4);
        assert_eq!(result.points[0].x, 2);
        assert_eq!(result.points[4].icon, 1);
        assert!(result.debug_image.is_none());
    }

    #[test]
    fn debug_sink_sees_every_stage() {
        let recorder = Recorder::default();
        let solver = Solver::default()
            .with_extractor(Box::new(Fixed))
            .with_debug_sink(Box::new(recorder.clone()));
        let result = solver.locate(&two_squares(), &blank(100, 100));
        assert_eq!(result.debug_image.as_deref(), Some("result"));
        let names = recorder.names.lock().unwrap().clone();
        assert_eq!(names.first().map(String::as_str), Some("target_icon_0"));
        assert!(names.contains(&"target_icon_1".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("result"));
    }

    #[test]
    fn broken_sink_does_not_change_the_result() {
        let plain = Solver::default().with_extractor(Box::new(Fixed));
        let noisy = Solver::default()
            .with_extractor(Box::new(Fixed))
            .with_debug_sink(Box::new(Broken));
        let a = plain.locate(&two_squares(), &blank(100, 100));
        let b = noisy.locate(&two_squares(), &blank(100, 100));
        assert_eq!(a, b);
        assert!(b.debug_image.is_none());
    }

    #[test]
    fn bad_neighbour_indices_fail_only_that_icon() {
        let solver = Solver::default()
            .with_extractor(Box::new(Fixed))
            .with_search(Box::new(Dangling));
        let result = solver.locate(&two_squares(), &blank(100, 100));
        assert!(!result.success);
        assert_eq!(result.icons.len(), 2);
        for report in &result.icons {
            assert_eq!(
                report.outcome,
                IconOutcome::Failed(IconFailure::InvalidCorrespondence {
                    query_idx: 0,
                    reference_idx: 999
                })
            );
        }
    }

    #[test]
    fn shared_solver_serves_concurrent_calls() {
        let recorder = Recorder::default();
        let solver = Solver::default()
            .with_extractor(Box::new(Fixed))
            .with_debug_sink(Box::new(recorder.clone()));
        let target = two_squares();
        let search = blank(100, 100);
        let expected = solver.locate(&target, &search);
        assert!(expected.success);

        let (solver, target, search) = (&solver, &target, &search);
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(move || solver.locate(target, search)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in results {
            assert_eq!(result, expected);
        }
        // One crop and one match per icon plus the result, for each of five runs.
        assert_eq!(recorder.names.lock().unwrap().len(), 5 * 5);
    }
}
