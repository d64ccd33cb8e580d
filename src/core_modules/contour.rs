// THEORY:
// Contour extraction turns the binary frame into closed point loops, one per
// bright region that stands on its own. `imageproc` does the border following
// (Suzuki-Abe, 8-connected, every border pixel kept); this module decides
// which of its borders count:
//
// 1.  **Outer Only**: hole borders are dropped. A hole is part of the region
//     around it, not a light of its own.
// 2.  **Top Level Only**: a component sitting inside another component's hole
//     is dropped with it. A ring lamp with a bright core is one light.
// 3.  **Filled Masks**: the kept border is rasterised as a filled polygon, so
//     holes are covered. That is what color sampling wants.

use crate::core_modules::smart_blob::{CandidateMask, MaskSpan, Point};
use image::{GrayImage, Luma};
use imageproc::contours::BorderType;
use imageproc::drawing::draw_polygon_mut;

const FILLED: Luma<u8> = Luma([255]);

/// A closed loop of border pixels of one connected component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rasterises the filled contour into horizontal runs, clipped to the
    /// frame. Border pixels are always included.
    pub fn fill_mask(&self, width: u32, height: u32) -> CandidateMask {
        if self.points.is_empty() || width == 0 || height == 0 {
            return CandidateMask::default();
        }

        let min_x = self.points.iter().map(|p| p.x).min().unwrap_or(0);
        let max_x = self.points.iter().map(|p| p.x).max().unwrap_or(0);
        let min_y = self.points.iter().map(|p| p.y).min().unwrap_or(0);
        let max_y = self.points.iter().map(|p| p.y).max().unwrap_or(0);
        if min_x >= width || min_y >= height {
            return CandidateMask::default();
        }

        // --- 1. Polygon in bounding-box coordinates ---
        let mut polygon: Vec<imageproc::point::Point<i32>> = self
            .points
            .iter()
            .map(|p| imageproc::point::Point::new((p.x - min_x) as i32, (p.y - min_y) as i32))
            .collect();
        polygon.dedup();
        while polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }

        // --- 2. Fill, then stamp the border itself ---
        let mut canvas = GrayImage::new(max_x - min_x + 1, max_y - min_y + 1);
        if polygon.len() >= 3 {
            draw_polygon_mut(&mut canvas, &polygon, FILLED);
        }
        for p in &polygon {
            canvas.put_pixel(p.x as u32, p.y as u32, FILLED);
        }

        // --- 3. Runs, clipped to the frame ---
        let last_x = (max_x - min_x).min(width - 1 - min_x);
        let last_y = (max_y - min_y).min(height - 1 - min_y);
        let mut spans = Vec::new();
        for y in 0..=last_y {
            let mut x = 0;
            while x <= last_x {
                if canvas.get_pixel(x, y) != &FILLED {
                    x += 1;
                    continue;
                }
                let start = x;
                while x <= last_x && canvas.get_pixel(x, y) == &FILLED {
                    x += 1;
                }
                spans.push(MaskSpan {
                    y: min_y + y,
                    x_start: min_x + start,
                    x_end: min_x + x - 1,
                });
            }
        }

        CandidateMask::from_spans(spans)
    }
}

/// Finds the outer border of every top-level foreground component, in
/// raster order of their first pixel.
pub fn find_contours(binary: &GrayImage) -> Vec<Contour> {
    imageproc::contours::find_contours::<u32>(binary)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| Contour {
            points: c.points.into_iter().map(|p| Point::new(p.x, p.y)).collect(),
        })
        .collect()
}
