// THEORY:
// The `smart_blob` module holds the data containers of the spatial stage. A
// `BlobCandidate` is one bright, roughly circular region that survived the
// extractor's gates in a single frame: where its mass is centered and the
// circle that encloses it. It has no memory of other frames.
//
// Each candidate owns a `CandidateMask`, the filled region of its contour as
// horizontal pixel runs. The mask is what the estimator samples to recover
// the light's color from the original frame, so it travels with the
// candidate rather than living in a side table keyed by some property of it.

use crate::core_modules::pixel::pixel::{ColorAccumulator, MeanColor, Pixel};
use image::RgbaImage;

/// A 2D pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// One horizontal run of mask pixels, `x_start..=x_end` on row `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskSpan {
    pub y: u32,
    pub x_start: u32,
    pub x_end: u32,
}

impl MaskSpan {
    pub fn len(&self) -> u64 {
        (self.x_end - self.x_start) as u64 + 1
    }
}

/// The filled region of a candidate's contour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateMask {
    spans: Vec<MaskSpan>,
}

impl CandidateMask {
    pub fn from_spans(spans: Vec<MaskSpan>) -> Self {
        Self { spans }
    }

    pub fn pixel_count(&self) -> u64 {
        self.spans.iter().map(MaskSpan::len).sum()
    }

    pub fn contains(&self, point: Point) -> bool {
        self.spans
            .iter()
            .any(|s| s.y == point.y && s.x_start <= point.x && point.x <= s.x_end)
    }

    /// Mean color of `frame` restricted to this mask. Pixels outside the
    /// frame are ignored; `None` if nothing under the mask is in bounds.
    pub fn mean_color(&self, frame: &RgbaImage) -> Option<MeanColor> {
        let mut acc = ColorAccumulator::new();
        for span in &self.spans {
            if span.y >= frame.height() {
                continue;
            }
            let last = span.x_end.min(frame.width().saturating_sub(1));
            for x in span.x_start..=last {
                if x >= frame.width() {
                    break;
                }
                acc.push(Pixel::from(frame.get_pixel(x, span.y)));
            }
        }
        acc.mean()
    }
}

/// Represents a single accepted light blob in one frame.
#[derive(Debug, Clone)]
pub struct BlobCandidate {
    /// Index assigned in contour order for this frame only. Not persistent.
    pub id: usize,
    /// Centroid `(u, v)` from the contour's spatial moments.
    pub centroid: (f64, f64),
    /// Center of the minimum enclosing circle.
    pub circle_center: (f64, f64),
    /// Radius of the minimum enclosing circle, in pixels.
    pub radius: f64,
    pub mask: CandidateMask,
}
