// THEORY:
// The `moment` module summarises the shape of a contour with its spatial
// moments. The contour is treated as a closed polygon through its border
// pixel centers, and Green's theorem turns the area integrals into sums over
// its edges, so no pixel of the interior is ever visited.
//
// Two things are read off the moments:
// 1.  **Centroid**: `(m10 / m00, m01 / m00)`, the center of mass of the filled
//     region. A zero `m00` (a point or a line) has no centroid.
// 2.  **Equivalent Ellipse**: the ellipse with the same second-order central
//     moments. For a filled ellipse this recovers the true axes; for any
//     other shape its axis ratio is a robust roundness measure.

use crate::core_modules::smart_blob::Point;

/// Spatial moments up to second order of a closed polygon.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m11: f64,
    pub m02: f64,
}

/// Geometric ellipse parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    /// Semi-major axis length.
    pub a: f64,
    /// Semi-minor axis length.
    pub b: f64,
    /// Rotation angle of the major axis from +x, in radians.
    pub angle: f64,
}

impl Ellipse {
    /// Minor-to-major axis ratio; `None` for a degenerate major axis.
    pub fn axis_ratio(&self) -> Option<f64> {
        if self.a <= f64::EPSILON {
            return None;
        }
        Some(self.b / self.a)
    }
}

impl SpatialMoments {
    /// Moments of the polygon through `points`, closed back to the first.
    /// Orientation does not matter; the area is always non-negative.
    pub fn from_contour(points: &[Point]) -> Self {
        let n = points.len();
        if n < 3 {
            return Self::default();
        }

        let mut m = Self::default();
        let mut prev = points[n - 1];
        for &current in points {
            let (xp, yp) = (prev.x as f64, prev.y as f64);
            let (xc, yc) = (current.x as f64, current.y as f64);
            let cross = xp * yc - xc * yp;

            m.m00 += cross;
            m.m10 += cross * (xp + xc);
            m.m01 += cross * (yp + yc);
            m.m20 += cross * (xp * (xp + xc) + xc * xc);
            m.m11 += cross * (xp * (2.0 * yp + yc) + xc * (yp + 2.0 * yc));
            m.m02 += cross * (yp * (yp + yc) + yc * yc);
            prev = current;
        }

        let sign = if m.m00 < 0.0 { -1.0 } else { 1.0 };
        Self {
            m00: sign * m.m00 / 2.0,
            m10: sign * m.m10 / 6.0,
            m01: sign * m.m01 / 6.0,
            m20: sign * m.m20 / 12.0,
            m11: sign * m.m11 / 24.0,
            m02: sign * m.m02 / 12.0,
        }
    }

    /// Center of mass, or `None` when the zeroth moment vanishes.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00.abs() <= f64::EPSILON {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }

    /// The ellipse with the same first and second order moments.
    pub fn equivalent_ellipse(&self) -> Option<Ellipse> {
        let (cx, cy) = self.centroid()?;

        // Normalized central moments (the region's covariance).
        let mu20 = self.m20 / self.m00 - cx * cx;
        let mu02 = self.m02 / self.m00 - cy * cy;
        let mu11 = self.m11 / self.m00 - cx * cy;

        let half_trace = (mu20 + mu02) / 2.0;
        let spread = (((mu20 - mu02) / 2.0).powi(2) + mu11 * mu11).sqrt();
        let major = (half_trace + spread).max(0.0);
        let minor = (half_trace - spread).max(0.0);

        Some(Ellipse {
            cx,
            cy,
            a: 2.0 * major.sqrt(),
            b: 2.0 * minor.sqrt(),
            angle: 0.5 * (2.0 * mu11).atan2(mu20 - mu02),
        })
    }
}
