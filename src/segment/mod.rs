//! Icon segmentation of the composite target image.
//!
//! The target is assumed to show dark icons on a light, mostly uniform
//! backdrop. Pixels at or below `background_cutoff` intensity are foreground.
//! Each outermost foreground contour becomes a candidate; shapes lying in a
//! hole of another shape belong to it, while shapes that merely fall inside
//! another's bounding box stay separate. Tiny boxes are discarded as
//! anti-aliasing speckle. Survivors are ordered left to right, padded,
//! clamped to the image, and cropped from the original colors.

use crate::image::{BoundingBox, RasterImage};
use crate::trace::{trace_event, trace_span};
use crate::util::IconMatchResult;
use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};

/// Segmentation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Intensities strictly above this value are background.
    pub background_cutoff: u8,
    /// Components whose bounding box area is below this are dropped.
    pub min_area: u64,
    /// Padding added on every side before cropping.
    pub padding: u32,
    /// Only outermost contours count; shapes inside another shape's holes
    /// are ignored. When off, every 8-connected component is a candidate.
    pub external_only: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            background_cutoff: 240,
            min_area: 100,
            padding: 2,
            external_only: true,
        }
    }
}

/// One icon cut from the target composite.
#[derive(Clone, Debug)]
pub struct IconRegion {
    /// Position in left-to-right order.
    pub index: usize,
    /// Padded, clamped box within the composite.
    pub bbox: BoundingBox,
    /// Cropped pixels.
    pub image: RasterImage,
}

/// Foreground mask: 255 where intensity is at or below `cutoff`, 0 elsewhere.
pub fn binarize(gray: &GrayImage, cutoff: u8) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
        *dst = Luma([if src[0] <= cutoff { 255 } else { 0 }]);
    }
    out
}

/// Bounding boxes of 8-connected foreground components, in label order.
pub fn component_boxes(binary: &GrayImage) -> Vec<BoundingBox> {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));

    // (min_x, min_y, max_x, max_y) per label; label 0 is background.
    let mut extents: Vec<Option<(u32, u32, u32, u32)>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if extents.len() < label {
            extents.resize(label, None);
        }
        let slot = &mut extents[label - 1];
        *slot = Some(match *slot {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    extents
        .into_iter()
        .flatten()
        .map(|(x0, y0, x1, y1)| BoundingBox {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
        .collect()
}

/// Bounding boxes of outermost contours, in contour discovery order.
///
/// A contour without a parent is not enclosed by any other shape, so this
/// keeps exactly the shapes visible from the background.
pub fn external_boxes(binary: &GrayImage) -> Vec<BoundingBox> {
    find_contours::<u32>(binary)
        .into_iter()
        .filter(|contour| contour.parent.is_none())
        .filter_map(|contour| {
            let first = contour.points.first()?;
            let init = (first.x, first.y, first.x, first.y);
            let (x0, y0, x1, y1) = contour.points.iter().fold(init, |(x0, y0, x1, y1), p| {
                (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
            });
            Some(BoundingBox {
                x: x0,
                y: y0,
                width: x1 - x0 + 1,
                height: y1 - y0 + 1,
            })
        })
        .collect()
}

/// Splits a composite target image into icon regions, ordered by ascending x.
///
/// Returns an empty vector when nothing qualifies.
pub fn segment(target: &RasterImage, cfg: &SegmentConfig) -> IconMatchResult<Vec<IconRegion>> {
    let _span = trace_span!("segment", width = target.width(), height = target.height()).entered();

    let binary = binarize(&target.to_gray(), cfg.background_cutoff);
    let candidates = if cfg.external_only {
        external_boxes(&binary)
    } else {
        component_boxes(&binary)
    };
    let mut boxes: Vec<BoundingBox> = candidates
        .into_iter()
        .filter(|bbox| bbox.area() >= cfg.min_area)
        .collect();
    boxes.sort_by_key(|bbox| bbox.x);

    let (width, height) = target.dimensions();
    let mut regions = Vec::with_capacity(boxes.len());
    for (index, bbox) in boxes.into_iter().enumerate() {
        let bbox = bbox.expand_clamped(cfg.padding, width, height);
        let image = target.crop(bbox)?;
        regions.push(IconRegion { index, bbox, image });
    }

    trace_event!("icons_segmented", count = regions.len());
    Ok(regions)
}
