//! Optional visual instrumentation of a solve.
//!
//! A [`DebugSink`] receives intermediate artifacts as the solver runs. Sinks
//! are side channels only: their errors are logged and never change the
//! result.

use crate::image::RasterImage;
use crate::pipeline::result::ClickPoint;
use crate::util::{IconMatchError, IconMatchResult};
use crate::verify::Point;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const POINT_RADIUS: i32 = 5;
const POINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Point colors cycled by icon index on the result image.
const ICON_PALETTE: [Rgb<u8>; 6] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
];

/// Something worth looking at while debugging a solve.
#[derive(Clone, Copy, Debug)]
pub enum DebugArtifact<'a> {
    /// A segmented target icon.
    IconCrop { index: usize, image: &'a RasterImage },
    /// Verified inlier points of one icon over the search image.
    IconMatch {
        index: usize,
        search: &'a RasterImage,
        points: &'a [Point],
        outline: Option<[[f64; 2]; 4]>,
    },
    /// All click points of the run over the search image.
    Result {
        search: &'a RasterImage,
        points: &'a [ClickPoint],
    },
}

impl DebugArtifact<'_> {
    /// Short file-name friendly label.
    pub fn name(&self) -> String {
        match self {
            DebugArtifact::IconCrop { index, .. } => format!("target_icon_{index}"),
            DebugArtifact::IconMatch { index, .. } => format!("match_debug_{index}"),
            DebugArtifact::Result { .. } => "result".to_string(),
        }
    }

    /// Renders the artifact as an RGB image.
    pub fn render(&self) -> RgbImage {
        match *self {
            DebugArtifact::IconCrop { image, .. } => image.as_rgb().clone(),
            DebugArtifact::IconMatch {
                search,
                points,
                outline,
                ..
            } => render_match(search, points, outline),
            DebugArtifact::Result { search, points } => render_result(search, points),
        }
    }
}

/// Receives debug artifacts. Returns a reference to what was stored, if any.
pub trait DebugSink: Send + Sync {
    fn record(&self, artifact: &DebugArtifact<'_>) -> IconMatchResult<Option<String>>;
}

/// Inlier points as dots and the projected icon outline.
pub fn render_match(
    search: &RasterImage,
    points: &[Point],
    outline: Option<[[f64; 2]; 4]>,
) -> RgbImage {
    let mut canvas = search.as_rgb().clone();
    for p in points {
        draw_filled_circle_mut(&mut canvas, (p.x, p.y), POINT_RADIUS, POINT_COLOR);
    }
    if let Some(corners) = outline {
        for i in 0..corners.len() {
            let a = corners[i];
            let b = corners[(i + 1) % corners.len()];
            for offset in [0.0f32, 1.0] {
                draw_line_segment_mut(
                    &mut canvas,
                    (a[0] as f32 + offset, a[1] as f32),
                    (b[0] as f32 + offset, b[1] as f32),
                    OUTLINE_COLOR,
                );
            }
        }
    }
    canvas
}

/// Click points colored by icon, each ringed for visibility.
pub fn render_result(search: &RasterImage, points: &[ClickPoint]) -> RgbImage {
    let mut canvas = search.as_rgb().clone();
    for p in points {
        let color = ICON_PALETTE[p.icon % ICON_PALETTE.len()];
        draw_filled_circle_mut(&mut canvas, (p.x, p.y), POINT_RADIUS, color);
        draw_hollow_circle_mut(&mut canvas, (p.x, p.y), POINT_RADIUS + 3, color);
    }
    canvas
}

/// Writes every artifact as `<name>_<unix millis>.png` into a directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> IconMatchResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

impl DebugSink for DirectorySink {
    fn record(&self, artifact: &DebugArtifact<'_>) -> IconMatchResult<Option<String>> {
        let path = self
            .dir
            .join(format!("{}_{}.png", artifact.name(), unix_millis()));
        artifact
            .render()
            .save(&path)
            .map_err(|err| IconMatchError::Encode {
                reason: err.to_string(),
            })?;
        Ok(Some(path.to_string_lossy().into_owned()))
    }
}
