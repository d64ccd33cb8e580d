// THEORY:
// The `LightEstimator` places each ranked blob candidate in 3D with a single
// camera. There is no stereo baseline, so depth comes from an assumption: the
// light at rank `i` is taken to have the physical diameter `table[i]`. That
// fixes a millimetre-per-pixel scale for the blob, and the camera's diagonal
// field of view turns the frame's half-diagonal into a depth.
//
// Per candidate at rank `i`:
// 1.  `mm_per_px = table[min(i, len - 1)] / (2 * radius)`.
// 2.  `depth = (half_diagonal / tan(fov / 2)) * mm_per_px`.
// 3.  Lateral and vertical offsets are the centroid's distance from the frame
//     center, scaled the same way. All three are converted to meters and
//     rounded to millimetres.
// 4.  Signs: lateral is negative when the centroid is left of center,
//     vertical is negative when the centroid is below center.
//
// Color comes from the frame itself, averaged under the candidate's mask, and
// the brightness is a weighted luminance of that mean.

use crate::config::EstimatorConfig;
use crate::core_modules::observation::{LightObservation, MAX_LIGHTS_PER_BATCH};
use crate::core_modules::smart_blob::BlobCandidate;
use image::RgbaImage;

pub mod light_estimator {
    use super::*;
    use tracing::debug;

    fn round_to(value: f64, decimals: i32) -> f64 {
        let factor = 10f64.powi(decimals);
        (value * factor).round() / factor
    }

    /// Physical diameter assumed for the light at `rank`. Ranks past the end
    /// of the table reuse its last entry.
    pub fn assumed_diameter_mm(table: &[f64], rank: usize) -> Option<f64> {
        let last = table.len().checked_sub(1)?;
        table.get(rank.min(last)).copied()
    }

    /// Camera-relative position in meters for one candidate, or `None` when
    /// the geometry is degenerate.
    pub fn locate(
        candidate: &BlobCandidate,
        rank: usize,
        frame_width: u32,
        frame_height: u32,
        config: &EstimatorConfig,
    ) -> Option<[f64; 3]> {
        let diameter_px = 2.0 * candidate.radius;
        if diameter_px <= 0.0 {
            return None;
        }
        let size_mm = assumed_diameter_mm(&config.light_diameters_mm, rank)?;
        let mm_per_px = size_mm / diameter_px;

        let (w, h) = (frame_width as f64, frame_height as f64);
        let (center_u, center_v) = (w / 2.0, h / 2.0);
        let (centroid_u, centroid_v) = candidate.centroid;

        let du = (center_u - centroid_u).abs();
        let dv = (center_v - centroid_v).abs();

        let half_fov = (config.diagonal_fov_degrees / 2.0).to_radians();
        let depth_mm = ((w * w + h * h).sqrt() / 2.0) / half_fov.tan() * mm_per_px;

        let mut x = round_to(du * mm_per_px / 1000.0, 3);
        let y = round_to(depth_mm / 1000.0, 3);
        let mut z = round_to(dv * mm_per_px / 1000.0, 3);

        if center_u > centroid_u {
            x = -x;
        }
        if center_v < centroid_v {
            z = -z;
        }

        Some([x, y, z])
    }

    /// Turns ranked candidates into at most [`MAX_LIGHTS_PER_BATCH`]
    /// observations. `frame` must be the frame the candidates were found in.
    pub fn estimate(
        candidates: &[BlobCandidate],
        frame: &RgbaImage,
        config: &EstimatorConfig,
    ) -> Vec<LightObservation> {
        let (width, height) = frame.dimensions();
        let mut observations = Vec::with_capacity(candidates.len().min(MAX_LIGHTS_PER_BATCH));

        for (rank, candidate) in candidates.iter().enumerate() {
            if observations.len() == MAX_LIGHTS_PER_BATCH {
                break;
            }

            let Some(position) = locate(candidate, rank, width, height, config) else {
                debug!(rank, radius = candidate.radius, "degenerate geometry, rank skipped");
                continue;
            };
            let Some(mean) = candidate.mask.mean_color(frame) else {
                debug!(rank, "empty mask, rank skipped");
                continue;
            };
            debug!(
                rank,
                id = candidate.id,
                centroid = ?candidate.centroid,
                circle_center = ?candidate.circle_center,
                radius = candidate.radius,
                ?position,
                "light located"
            );

            observations.push(LightObservation {
                position,
                radius: candidate.radius,
                mean_intensity: round_to(mean.perceived_intensity(), 1),
                color: [
                    round_to(mean.r, 1),
                    round_to(mean.g, 1),
                    round_to(mean.b, 1),
                    round_to(mean.a, 1),
                ],
            });
        }

        observations
    }
}
