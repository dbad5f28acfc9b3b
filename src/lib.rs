//! IconMatch locates the icons of a click-captcha hint image inside the
//! captcha scene.
//!
//! The hint ("target") image shows a row of icons on a light background; the
//! scene ("search") image contains the same icons somewhere, possibly scaled,
//! rotated, or in perspective. [`Solver::crack_captcha`] segments the target
//! into icons, matches ORB-style binary features of each icon against the
//! scene, keeps geometrically consistent matches with a RANSAC homography,
//! and reports deduplicated click points per icon.
//!
//! Each stage is usable on its own: [`image::codec`](crate::image::codec), [`segment`],
//! [`features`], [`matching`], [`verify`], and [`dedup`]. Optional features
//! add `rayon` parallelism and `tracing` instrumentation.

pub mod dedup;
pub mod features;
pub mod image;
pub mod matching;
pub mod pipeline;
pub mod segment;
mod trace;
pub mod util;
pub mod verify;

pub use dedup::{dedupe_points, DedupConfig};
pub use features::{
    Descriptor, FeatureConfig, FeatureExtractor, FeatureSet, Keypoint, OrbExtractor,
};
pub use crate::image::{BoundingBox, RasterImage};
pub use matching::{
    match_features, match_sets, AutoSearch, BruteForceSearch, Correspondence, KnnBackend,
    KnnIndex, KnnSearch, LshSearch, MatchConfig,
};
pub use pipeline::{
    ClickPoint, DebugArtifact, DebugSink, DirectorySink, IconOutcome, IconReport, ImageRole,
    SolveFailure, SolveResult, Solver, SolverConfig,
};
pub use segment::{segment, IconRegion, SegmentConfig};
pub use util::{DecodeError, FeatureSide, IconFailure, IconMatchError, IconMatchResult};
pub use verify::{verify, Homography, Point, RansacConfig, Verification};
