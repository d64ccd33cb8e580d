// THEORY:
// The minimum enclosing circle is the size measure of a blob. Its radius is
// what ranks lights against each other and what the geometric estimator
// turns into a pixel-to-millimetre scale.
//
// The incremental form of Welzl's algorithm is used: whenever a point falls
// outside the current circle, that point must lie on the boundary of the
// circle of everything seen so far, which fixes one (then two, then three)
// boundary points and rebuilds the circle from them.

use crate::core_modules::smart_blob::Point;

const CONTAINMENT_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: (f64, f64),
    pub radius: f64,
}

impl Circle {
    fn contains(&self, p: (f64, f64)) -> bool {
        let dx = p.0 - self.center.0;
        let dy = p.1 - self.center.1;
        (dx * dx + dy * dy).sqrt() <= self.radius + CONTAINMENT_EPSILON * self.radius.max(1.0)
    }

    fn from_pair(a: (f64, f64), b: (f64, f64)) -> Self {
        let center = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
        let radius = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt() / 2.0;
        Self { center, radius }
    }

    /// Circumcircle of three points; collinear triples fall back to the
    /// circle over their farthest pair.
    fn from_triple(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() <= f64::EPSILON {
            let candidates = [Self::from_pair(a, b), Self::from_pair(a, c), Self::from_pair(b, c)];
            return candidates
                .into_iter()
                .max_by(|x, y| x.radius.total_cmp(&y.radius))
                .unwrap_or(Self::from_pair(a, b));
        }

        let a2 = a.0 * a.0 + a.1 * a.1;
        let b2 = b.0 * b.0 + b.1 * b.1;
        let c2 = c.0 * c.0 + c.1 * c.1;
        let ux = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
        let uy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
        let radius = ((a.0 - ux).powi(2) + (a.1 - uy).powi(2)).sqrt();
        Self {
            center: (ux, uy),
            radius,
        }
    }
}

/// Smallest circle containing every point, or `None` for an empty set.
pub fn min_enclosing_circle(points: &[Point]) -> Option<Circle> {
    let pts: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let first = *pts.first()?;

    let mut circle = Circle {
        center: first,
        radius: 0.0,
    };
    for i in 1..pts.len() {
        if circle.contains(pts[i]) {
            continue;
        }
        circle = Circle {
            center: pts[i],
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(pts[j]) {
                continue;
            }
            circle = Circle::from_pair(pts[i], pts[j]);
            for k in 0..j {
                if !circle.contains(pts[k]) {
                    circle = Circle::from_triple(pts[i], pts[j], pts[k]);
                }
            }
        }
    }

    Some(circle)
}
