//! Error types for iconmatch.

use serde::Serialize;
use thiserror::Error;

/// Result alias for iconmatch operations.
pub type IconMatchResult<T> = std::result::Result<T, IconMatchError>;

/// Errors that can occur when running iconmatch stages directly.
///
/// The top-level [`Solver`](crate::Solver) never returns these; it folds them
/// into a failed [`SolveResult`](crate::SolveResult) instead.
#[derive(Debug, Error)]
pub enum IconMatchError {
    /// The image payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A crop rectangle does not fit inside its source image.
    #[error(
        "region ({x}, {y}, {width}x{height}) out of bounds for {img_width}x{img_height} image"
    )]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },
    /// Writing a debug artifact failed.
    #[error("debug artifact: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding an image failed.
    #[error("image encode failed: {reason}")]
    Encode { reason: String },
}

/// Failures while turning a text payload into a raster image.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Nothing left to decode after stripping the scheme prefix.
    #[error("empty image payload")]
    EmptyPayload,
    /// The payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The bytes are not a supported image format, or are truncated.
    #[error("unsupported or corrupt image data: {reason}")]
    Image { reason: String },
    /// The image decoded to zero pixels.
    #[error("image has zero width or height")]
    EmptyImage,
}

/// Which side of a match produced no usable features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSide {
    Icon,
    Search,
}

impl std::fmt::Display for FeatureSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FeatureSide::Icon => "icon",
            FeatureSide::Search => "search",
        })
    }
}

/// Per-icon failure reasons. None of these abort a run.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IconFailure {
    /// The extractor found no keypoints on one side.
    #[error("no features detected in the {side} image")]
    NoFeatures { side: FeatureSide },
    /// Too few correspondences survived the ratio test to fit a homography.
    #[error("insufficient correspondences: need {needed}, found {found}")]
    InsufficientCorrespondences { needed: usize, found: usize },
    /// Robust fitting could not produce a transform.
    #[error("degenerate homography")]
    DegenerateHomography,
    /// A matcher returned an index outside its feature sets.
    #[error("correspondence {query_idx} -> {reference_idx} refers to a missing feature")]
    InvalidCorrespondence {
        query_idx: usize,
        reference_idx: usize,
    },
}
