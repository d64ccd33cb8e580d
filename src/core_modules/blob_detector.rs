// THEORY:
// The `BlobDetector` is the spatial stage of the estimator. It receives the
// outer contours of the thresholded frame and decides which of them look like
// a light source rather than a reflection, a window edge or sensor noise.
//
// Key architectural principles & algorithm steps:
// 1.  **Moment Validity**: a contour whose zeroth moment vanishes (a single
//     pixel, a straight line) has no centroid and cannot be located.
// 2.  **Size Gate**: the minimum enclosing circle must be at least 1% and less
//     than 70% of the frame's shorter side. Specks and frame-filling glare
//     are both rejected.
// 3.  **Shape Gate**: the ellipse with the contour's second-order moments must
//     be round, its minor-to-major ratio inside a configurable band. Contours
//     with fewer than five points carry too little shape to judge.
// 4.  **Mask Retention**: each survivor's filled region travels with it as a
//     `CandidateMask`, keyed by the candidate itself, so two blobs of equal
//     radius never share or overwrite a mask.
// 5.  **Ranking**: survivors are sorted by descending radius. Rank is the
//     only identity a candidate has downstream.
// 6.  **Stateless Utility**: like the rest of the spatial stage, the detector
//     has no memory of previous frames.

use crate::config::CandidateGates;
use crate::core_modules::contour::Contour;
use crate::core_modules::enclosing_circle::min_enclosing_circle;
use crate::core_modules::moment::SpatialMoments;
use crate::core_modules::smart_blob::BlobCandidate;

/// Contours shorter than this are rejected before any ellipse is fitted.
pub const MIN_CONTOUR_POINTS: usize = 5;

pub mod blob_detector {
    use super::*;
    use tracing::debug;

    /// Why a contour did not become a candidate.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Rejection {
        ZeroMoment,
        TooSmall(f64),
        TooLarge(f64),
        TooFewPoints(usize),
        NotRound(Option<f64>),
    }

    /// Runs every contour through the gates and returns the accepted
    /// candidates ranked by descending radius.
    pub fn find_candidates(
        contours: &[Contour],
        frame_width: u32,
        frame_height: u32,
        gates: &CandidateGates,
    ) -> Vec<BlobCandidate> {
        let (min_radius, max_radius) = gates.radius_bounds(frame_width, frame_height);

        let mut candidates: Vec<BlobCandidate> = Vec::new();
        for (index, contour) in contours.iter().enumerate() {
            match evaluate(index, contour, frame_width, frame_height, min_radius, max_radius, gates) {
                Ok(candidate) => candidates.push(candidate),
                Err(reason) => debug!(contour = index, ?reason, "contour rejected"),
            }
        }

        // Stable sort: equal radii keep contour order.
        candidates.sort_by(|a, b| b.radius.total_cmp(&a.radius));
        debug!(accepted = candidates.len(), total = contours.len(), "blob candidates extracted");
        candidates
    }

    fn evaluate(
        index: usize,
        contour: &Contour,
        frame_width: u32,
        frame_height: u32,
        min_radius: f64,
        max_radius: f64,
        gates: &CandidateGates,
    ) -> Result<BlobCandidate, Rejection> {
        // --- 1. Moment Validity ---
        let moments = SpatialMoments::from_contour(&contour.points);
        let centroid = moments.centroid().ok_or(Rejection::ZeroMoment)?;

        // --- 2. Size Gate ---
        let circle = min_enclosing_circle(&contour.points).ok_or(Rejection::ZeroMoment)?;
        if circle.radius < min_radius {
            return Err(Rejection::TooSmall(circle.radius));
        }
        if circle.radius >= max_radius {
            return Err(Rejection::TooLarge(circle.radius));
        }

        // --- 3. Shape Gate ---
        if contour.len() < MIN_CONTOUR_POINTS {
            return Err(Rejection::TooFewPoints(contour.len()));
        }
        let ratio = moments.equivalent_ellipse().and_then(|e| e.axis_ratio());
        match ratio {
            Some(r) if r >= gates.circularity_min && r <= gates.circularity_max => {}
            other => return Err(Rejection::NotRound(other)),
        }

        // --- 4. Mask Retention ---
        let mask = contour.fill_mask(frame_width, frame_height);

        Ok(BlobCandidate {
            id: index,
            centroid,
            circle_center: circle.center,
            radius: circle.radius,
            mask,
        })
    }
}
