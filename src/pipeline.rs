// THEORY:
// The `pipeline` module is the top-level API of the estimating side. It runs
// one color frame through the whole stack and hands back the ranked light
// batch for that frame:
//
//   mirror -> luma -> threshold -> contours -> candidates -> observations
//
// The pipeline is stateless between frames. Everything it needs is in its
// `EstimatorConfig`, fixed at construction, so one instance can be shared by
// reference across worker threads.

use crate::config::EstimatorConfig;
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::contour::find_contours;
use crate::core_modules::light_estimator::light_estimator;
use crate::core_modules::threshold::{mirror_horizontal, threshold, to_luma};
use crate::error::{ConfigError, EstimateError};
use image::{GrayImage, RgbaImage};
use std::borrow::Cow;
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::observation::{LightBatch, LightObservation};

/// Everything one frame produced.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    /// Thresholded frame, after mirroring.
    pub binary: GrayImage,
    pub contour_count: usize,
    pub candidate_count: usize,
    /// Ranked, at most eight.
    pub observations: Vec<LightObservation>,
}

impl FrameAnalysis {
    pub fn batch(&self) -> LightBatch {
        LightBatch::from_observations(&self.observations)
    }
}

pub struct EstimationPipeline {
    config: EstimatorConfig,
}

impl EstimationPipeline {
    /// Fails on a config that could only produce unsendable batches.
    pub fn new(config: EstimatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn generate_batch(&self, frame: &RgbaImage) -> Result<LightBatch, EstimateError> {
        Ok(self.analyze(frame)?.batch())
    }

    pub fn analyze(&self, frame: &RgbaImage) -> Result<FrameAnalysis, EstimateError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(EstimateError::EmptyFrame { width, height });
        }

        // Stage 1: Frame Preparation
        let frame: Cow<'_, RgbaImage> = if self.config.mirror_horizontal {
            Cow::Owned(mirror_horizontal(frame))
        } else {
            Cow::Borrowed(frame)
        };
        let binary = threshold(&to_luma(&frame), self.config.threshold_level, self.config.polarity);

        // Stage 2: Spatial Grouping
        let contours = find_contours(&binary);
        let candidates = blob_detector::find_candidates(&contours, width, height, &self.config.gates);

        // Stage 3: Geometric Estimation
        let observations = light_estimator::estimate(&candidates, &frame, &self.config);

        debug!(
            contours = contours.len(),
            candidates = candidates.len(),
            observations = observations.len(),
            "frame analysed"
        );
        Ok(FrameAnalysis {
            binary,
            contour_count: contours.len(),
            candidate_count: candidates.len(),
            observations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::threshold::Polarity;
    use image::Rgba;

    fn frame_with_discs(width: u32, height: u32, background: [u8; 4], discs: &[(i64, i64, i64, [u8; 4])]) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            for &(cx, cy, r, color) in discs {
                if (x as i64 - cx).pow(2) + (y as i64 - cy).pow(2) <= r * r {
                    return Rgba(color);
                }
            }
            Rgba(background)
        })
    }

    #[test]
    fn bright_discs_become_ranked_observations() {
        let frame = frame_with_discs(
            320,
            240,
            [20, 20, 20, 255],
            &[(80, 60, 10, [255, 250, 240, 255]), (200, 150, 25, [255, 255, 255, 255])],
        );
        let pipeline = EstimationPipeline::new(EstimatorConfig::default()).unwrap();
        let analysis = pipeline.analyze(&frame).unwrap();

        assert_eq!(analysis.candidate_count, 2);
        assert_eq!(analysis.observations.len(), 2);
        assert!(analysis.observations[0].radius > analysis.observations[1].radius);
        assert_eq!(analysis.observations[0].color, [255.0, 255.0, 255.0, 255.0]);
        assert_eq!(analysis.observations[0].mean_intensity, 255.0);
    }

    #[test]
    fn mirroring_flips_the_lateral_sign() {
        // Disc left of center in the raw frame.
        let frame = frame_with_discs(200, 200, [0, 0, 0, 255], &[(40, 100, 12, [255, 255, 255, 255])]);

        let mirrored = EstimationPipeline::new(EstimatorConfig::default()).unwrap();
        let x_mirrored = mirrored.analyze(&frame).unwrap().observations[0].position[0];
        assert!(x_mirrored > 0.0);

        let raw = EstimationPipeline::new(EstimatorConfig {
            mirror_horizontal: false,
            ..EstimatorConfig::default()
        })
        .unwrap();
        let x_raw = raw.analyze(&frame).unwrap().observations[0].position[0];
        assert!(x_raw < 0.0);
    }

    #[test]
    fn dark_polarity_finds_dark_sources() {
        let frame = frame_with_discs(200, 200, [240, 240, 240, 255], &[(100, 100, 15, [10, 10, 10, 255])]);
        let pipeline = EstimationPipeline::new(EstimatorConfig {
            threshold_level: 50,
            polarity: Polarity::Dark,
            ..EstimatorConfig::default()
        })
        .unwrap();
        let batch = pipeline.generate_batch(&frame).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.lights[0].r, 10.0);
    }

    #[test]
    fn frame_without_lights_is_an_empty_batch() {
        let frame = RgbaImage::from_pixel(64, 48, Rgba([30, 30, 30, 255]));
        let pipeline = EstimationPipeline::new(EstimatorConfig::default()).unwrap();
        assert!(pipeline.generate_batch(&frame).unwrap().is_empty());
    }

    #[test]
    fn degenerate_field_of_view_is_refused() {
        for fov in [0.0, 180.0, f64::NAN] {
            let result = EstimationPipeline::new(EstimatorConfig {
                diagonal_fov_degrees: fov,
                ..EstimatorConfig::default()
            });
            assert!(matches!(result, Err(ConfigError::FieldOfView(_))));
        }
    }

    #[test]
    fn inverted_circularity_band_is_refused() {
        let mut config = EstimatorConfig::default();
        config.gates.circularity_min = 1.1;
        config.gates.circularity_max = 0.9;
        assert!(matches!(
            EstimationPipeline::new(config),
            Err(ConfigError::InvertedCircularityBand { .. })
        ));
    }

    #[test]
    fn empty_frame_is_an_error() {
        let pipeline = EstimationPipeline::new(EstimatorConfig::default()).unwrap();
        let result = pipeline.analyze(&RgbaImage::new(0, 0));
        assert!(matches!(result, Err(EstimateError::EmptyFrame { .. })));
    }
}
