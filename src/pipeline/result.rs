//! Run outcome types returned by [`Solver`](crate::Solver).

use crate::image::BoundingBox;
use crate::util::{DecodeError, IconFailure};
use crate::verify::Point;
use serde::Serialize;
use thiserror::Error;

/// Which input payload a run-level failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Target,
    Search,
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ImageRole::Target => "target",
            ImageRole::Search => "search",
        })
    }
}

/// Failures that end a run before any icon is matched.
#[derive(Debug, Error)]
pub enum SolveFailure {
    #[error("image decode failed ({which}): {source}")]
    Decode {
        which: ImageRole,
        #[source]
        source: DecodeError,
    },
    #[error("no target icons extracted")]
    NoIconsExtracted,
}

/// A click location in search-image pixels, tagged with its icon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClickPoint {
    pub x: i32,
    pub y: i32,
    /// Index of the target icon this point locates.
    pub icon: usize,
}

impl ClickPoint {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// What happened to one icon.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconOutcome {
    /// Verified and deduplicated; `points` may still be empty.
    Located { points: Vec<Point>, inliers: usize },
    /// Skipped; contributes no points.
    Failed(IconFailure),
}

impl IconOutcome {
    pub fn points(&self) -> &[Point] {
        match self {
            IconOutcome::Located { points, .. } => points,
            IconOutcome::Failed(_) => &[],
        }
    }
}

/// Per-icon diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IconReport {
    pub index: usize,
    /// Padded box of the icon within the target image.
    pub bbox: BoundingBox,
    pub outcome: IconOutcome,
}

/// Result of one solve.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SolveResult {
    /// True iff at least one click point was produced.
    pub success: bool,
    /// Click points of all icons, in icon order.
    pub points: Vec<ClickPoint>,
    pub message: String,
    /// Location of the rendered result image, if a debug sink produced one.
    pub debug_image: Option<String>,
    pub icons: Vec<IconReport>,
}

impl SolveResult {
    pub(crate) fn failed(failure: &SolveFailure) -> Self {
        Self {
            success: false,
            points: Vec::new(),
            message: failure.to_string(),
            debug_image: None,
            icons: Vec::new(),
        }
    }

    pub(crate) fn finished(
        points: Vec<ClickPoint>,
        icons: Vec<IconReport>,
        debug_image: Option<String>,
    ) -> Self {
        Self {
            success: !points.is_empty(),
            message: format!("found {} click points", points.len()),
            points,
            debug_image,
            icons,
        }
    }

    /// Points belonging to icon `index`.
    pub fn points_for(&self, index: usize) -> impl Iterator<Item = &ClickPoint> {
        self.points.iter().filter(move |p| p.icon == index)
    }
}
