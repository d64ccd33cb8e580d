//! Session configuration.
//!
//! Every tunable the estimator, the reconciliation engine and the transport
//! read lives in one of the value objects below. They are built once, before
//! a session starts, and handed to each component at construction; nothing
//! reads process-wide state afterwards.

use crate::core_modules::threshold::Polarity;
use crate::error::ConfigError;
use glam::Vec3;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8052;
pub const DEFAULT_LIGHT_DIAMETERS_MM: [f64; 2] = [330.02, 68.7];
pub const CM_TO_MM: f64 = 10.0;
pub const CM_TO_M: f32 = 0.01;

/// Acceptance gates applied to every contour before it becomes a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGates {
    /// Lower radius bound as a fraction of `min(width, height)`.
    pub min_radius_fraction: f64,
    /// Upper (exclusive) radius bound as a fraction of `min(width, height)`.
    pub max_radius_fraction: f64,
    /// Accepted band for the minor-to-major ellipse axis ratio.
    pub circularity_min: f64,
    pub circularity_max: f64,
}

impl Default for CandidateGates {
    fn default() -> Self {
        Self {
            min_radius_fraction: 0.01,
            max_radius_fraction: 0.7,
            circularity_min: 0.8,
            circularity_max: 1.2,
        }
    }
}

impl CandidateGates {
    pub fn radius_bounds(&self, width: u32, height: u32) -> (f64, f64) {
        let side = width.min(height) as f64;
        (side * self.min_radius_fraction, side * self.max_radius_fraction)
    }
}

/// Configuration of the estimating side.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Gray level separating foreground from background.
    pub threshold_level: u8,
    pub polarity: Polarity,
    /// Mirror frames horizontally before analysis.
    pub mirror_horizontal: bool,
    /// Diagonal field of view of the capturing camera, in degrees.
    pub diagonal_fov_degrees: f64,
    /// Assumed physical diameters in millimetres, index-aligned to rank.
    pub light_diameters_mm: Vec<f64>,
    pub gates: CandidateGates,
    /// Frames arriving sooner than this after the last analysed one are dropped.
    pub min_analysis_interval: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            threshold_level: 230,
            polarity: Polarity::Bright,
            mirror_horizontal: true,
            diagonal_fov_degrees: 80.0,
            light_diameters_mm: DEFAULT_LIGHT_DIAMETERS_MM.to_vec(),
            gates: CandidateGates::default(),
            min_analysis_interval: Duration::from_millis(300),
        }
    }
}

impl EstimatorConfig {
    /// Replaces the size table from operator input in centimetres. Input
    /// that yields no usable value keeps the current table.
    pub fn with_diameters_cm(mut self, input: &str) -> Self {
        let parsed = parse_diameters_cm(input);
        if !parsed.is_empty() {
            self.light_diameters_mm = parsed;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.diagonal_fov_degrees > 0.0 && self.diagonal_fov_degrees < 180.0) {
            return Err(ConfigError::FieldOfView(self.diagonal_fov_degrees));
        }
        if self.gates.circularity_min > self.gates.circularity_max {
            return Err(ConfigError::InvertedCircularityBand {
                min: self.gates.circularity_min,
                max: self.gates.circularity_max,
            });
        }
        Ok(())
    }
}

/// Parses a comma separated list of whole centimetres into millimetres.
/// Tokens that are not integers are skipped.
pub fn parse_diameters_cm(input: &str) -> Vec<f64> {
    input
        .split(',')
        .filter_map(|token| token.trim().parse::<u32>().ok())
        .map(|cm| cm as f64 * CM_TO_MM)
        .collect()
}

/// Hysteresis tolerances. Color is compared against `color / 255`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub radius: f32,
    pub position: f32,
    pub color: f32,
    pub intensity: f32,
}

impl Thresholds {
    /// All tolerances share one base unit.
    pub fn uniform(base: f32) -> Self {
        Self {
            radius: base,
            position: base,
            color: base,
            intensity: base,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::uniform(10.0)
    }
}

/// Configuration of the renderer-side reconciliation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    pub thresholds: Thresholds,
    /// Scene scale applied to directional positions; Point lights use half.
    pub scene_scale: f32,
    /// Physical mounting offset of the capture device, in metres.
    pub offset_x: f32,
    pub offset_z: f32,
    /// Pose the directional light returns to when no light is found.
    pub default_position: Vec3,
    /// Euler angles in degrees.
    pub default_rotation: Vec3,
    /// Divisor for Point light intensities.
    pub point_intensity_scale: f32,
    /// Multiplier (< 1) dimming the directional light.
    pub directional_damping: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            scene_scale: 1.0,
            offset_x: 0.0,
            offset_z: 0.0,
            default_position: Vec3::new(0.0, 4.0, 0.0),
            default_rotation: Vec3::new(90.0, 0.0, 0.0),
            point_intensity_scale: 10.0,
            directional_damping: 0.7,
        }
    }
}

/// Configuration of the observation transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub bind_address: String,
    /// Upper bound on concurrently handled connections.
    pub max_connections: usize,
    pub read_timeout: Duration,
    pub max_frame_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: 4,
            read_timeout: Duration::from_secs(5),
            max_frame_len: 64 * 1024,
        }
    }
}

/// Everything a renderer-side session needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub estimator: EstimatorConfig,
    pub reconcile: ReconcileConfig,
    pub transport: TransportConfig,
}

impl SessionConfig {
    /// Builds a configuration from `LUMEN_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SessionConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind) = lookup("LUMEN_BIND") {
            config.transport.bind_address = bind;
        }
        if let Some(max) = parse_var::<usize, _>(&lookup, "LUMEN_MAX_CONNECTIONS")? {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "LUMEN_MAX_CONNECTIONS",
                    value: max.to_string(),
                    reason: "must be at least 1".into(),
                });
            }
            config.transport.max_connections = max;
        }
        if let Some(list) = lookup("LUMEN_LIGHT_DIAMETERS_CM") {
            config.estimator = config.estimator.with_diameters_cm(&list);
        }
        if let Some(cm) = parse_var::<f32, _>(&lookup, "LUMEN_OFFSET_X_CM")? {
            config.reconcile.offset_x = cm * CM_TO_M;
        }
        if let Some(cm) = parse_var::<f32, _>(&lookup, "LUMEN_OFFSET_Z_CM")? {
            config.reconcile.offset_z = cm * CM_TO_M;
        }
        if let Some(y) = parse_var::<f32, _>(&lookup, "LUMEN_DEFAULT_Y")? {
            config.reconcile.default_position.y = y;
        }
        if let Some(scale) = parse_var::<f32, _>(&lookup, "LUMEN_SCENE_SCALE")? {
            config.reconcile.scene_scale = scale;
        }
        if let Some(base) = parse_var::<f32, _>(&lookup, "LUMEN_THRESHOLD")? {
            config.reconcile.thresholds = Thresholds::uniform(base);
        }

        config.estimator.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: err.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn diameters_are_converted_and_bad_tokens_skipped() {
        assert_eq!(parse_diameters_cm("33, x, 7,"), vec![330.0, 70.0]);
    }

    #[test]
    fn empty_diameter_input_keeps_defaults() {
        let config = EstimatorConfig::default().with_diameters_cm(" , ");
        assert_eq!(config.light_diameters_mm, DEFAULT_LIGHT_DIAMETERS_MM.to_vec());
    }

    #[test]
    fn env_values_are_converted_to_scene_units() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("LUMEN_OFFSET_X_CM", "25"),
            ("LUMEN_OFFSET_Z_CM", "-50"),
            ("LUMEN_DEFAULT_Y", "2.5"),
            ("LUMEN_LIGHT_DIAMETERS_CM", "12"),
            ("LUMEN_BIND", "127.0.0.1:9000"),
        ]))
        .unwrap();

        assert!((config.reconcile.offset_x - 0.25).abs() < 1e-6);
        assert!((config.reconcile.offset_z + 0.5).abs() < 1e-6);
        assert_eq!(config.reconcile.default_position, Vec3::new(0.0, 2.5, 0.0));
        assert_eq!(config.estimator.light_diameters_mm, vec![120.0]);
        assert_eq!(config.transport.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn invalid_env_value_is_a_config_error() {
        let err = SessionConfig::from_lookup(lookup_from(&[("LUMEN_SCENE_SCALE", "big")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "LUMEN_SCENE_SCALE", .. }));
    }

    #[test]
    fn zero_connections_rejected() {
        let err = SessionConfig::from_lookup(lookup_from(&[("LUMEN_MAX_CONNECTIONS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn inverted_band_fails_validation() {
        let mut config = EstimatorConfig::default();
        config.gates.circularity_min = 1.3;
        assert!(matches!(config.validate(), Err(ConfigError::InvertedCircularityBand { .. })));
    }
}
