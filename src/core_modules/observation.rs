// THEORY:
// An observation is one detected light's estimate for one capture cycle. It
// exists in three shapes along the data flow:
//
// 1.  **LightObservation**: what the estimator produces, full precision,
//     meters and 0-255 color.
// 2.  **LightRecord / LightBatch**: the wire shape. A batch is the complete
//     ranked list for one cycle and is the unit of transport; a record's
//     radius is an integer pixel count.
// 3.  **IncomingLight**: what the reconciliation engine consumes, in scene
//     types (`glam` vectors) with the color already normalized to 0-1.
//
// Batches are validated as a whole. A batch with more lights than a cycle can
// produce is malformed, the same as one that does not parse.

use crate::error::{TransportError, TransportResult};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Upper bound on observations per cycle.
pub const MAX_LIGHTS_PER_BATCH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct LightObservation {
    /// Camera-relative (lateral, depth, vertical) position in meters.
    pub position: [f64; 3],
    /// Enclosing circle radius in pixels.
    pub radius: f64,
    pub mean_intensity: f64,
    /// RGBA on the 0-255 scale.
    pub color: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: u32,
    pub mean_intensity: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl From<&LightObservation> for LightRecord {
    fn from(obs: &LightObservation) -> Self {
        let [x, y, z] = obs.position;
        let [r, g, b, a] = obs.color;
        Self {
            x,
            y,
            z,
            radius: obs.radius.round().max(0.0) as u32,
            mean_intensity: obs.mean_intensity,
            r,
            g,
            b,
            a,
        }
    }
}

/// The ranked observation list of one capture cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightBatch {
    pub lights: Vec<LightRecord>,
}

impl LightBatch {
    pub fn from_observations(observations: &[LightObservation]) -> Self {
        Self {
            lights: observations.iter().map(LightRecord::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn to_json(&self) -> TransportResult<Vec<u8>> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes and validates a payload. Anything that is not a well formed
    /// batch of at most [`MAX_LIGHTS_PER_BATCH`] lights is malformed.
    pub fn from_json(payload: &[u8]) -> TransportResult<Self> {
        let batch: Self = serde_json::from_slice(payload)?;
        batch.validate()?;
        Ok(batch)
    }

    fn validate(&self) -> TransportResult<()> {
        if self.lights.len() > MAX_LIGHTS_PER_BATCH {
            return Err(TransportError::TooManyLights(self.lights.len()));
        }
        Ok(())
    }

    /// Converts into the renderer-side representation, preserving rank.
    pub fn into_incoming(self) -> Vec<IncomingLight> {
        self.lights.iter().map(IncomingLight::from).collect()
    }
}

/// One ranked light as the reconciliation engine sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncomingLight {
    pub position: Vec3,
    pub radius: f32,
    /// Raw mean intensity; each light kind normalizes it differently.
    pub intensity: f32,
    /// Normalized 0-1 RGBA.
    pub color: Vec4,
}

impl From<&LightRecord> for IncomingLight {
    fn from(record: &LightRecord) -> Self {
        Self {
            position: Vec3::new(record.x as f32, record.y as f32, record.z as f32),
            radius: record.radius as f32,
            intensity: record.mean_intensity as f32,
            color: Vec4::new(record.r as f32, record.g as f32, record.b as f32, record.a as f32) / 255.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(radius: f64) -> LightObservation {
        LightObservation {
            position: [0.125, 1.5, -0.25],
            radius,
            mean_intensity: 240.3,
            color: [255.0, 204.0, 102.0, 255.0],
        }
    }

    #[test]
    fn record_rounds_radius_to_whole_pixels() {
        assert_eq!(LightRecord::from(&observation(49.6)).radius, 50);
        assert_eq!(LightRecord::from(&observation(12.4)).radius, 12);
    }

    #[test]
    fn wire_shape_uses_flat_keys() {
        let batch = LightBatch::from_observations(&[observation(10.0)]);
        let json: serde_json::Value = serde_json::from_slice(&batch.to_json().unwrap()).unwrap();
        let light = &json["lights"][0];
        for key in ["x", "y", "z", "radius", "mean_intensity", "r", "g", "b", "a"] {
            assert!(light.get(key).is_some(), "missing {key}");
        }
        assert_eq!(light["radius"], 10);
    }

    #[test]
    fn empty_batch_is_valid() {
        let batch = LightBatch::from_json(br#"{"lights": []}"#).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(LightBatch::from_json(b"{}"), Err(TransportError::Malformed(_))));
        assert!(matches!(LightBatch::from_json(b"not json"), Err(TransportError::Malformed(_))));
        assert!(matches!(LightBatch::from_json(&[0xff, 0xfe]), Err(TransportError::Malformed(_))));
        assert!(matches!(
            LightBatch::from_json(br#"{"lights": [{"x": 0}]}"#),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn more_than_eight_lights_is_malformed() {
        let batch = LightBatch::from_observations(&vec![observation(5.0); 9]);
        let json = serde_json::to_vec(&batch).unwrap();
        assert!(matches!(LightBatch::from_json(&json), Err(TransportError::TooManyLights(9))));
        assert!(batch.to_json().is_err());
    }

    #[test]
    fn incoming_color_is_normalized() {
        let batch = LightBatch::from_observations(&[observation(30.0)]);
        let incoming = batch.into_incoming();
        assert_eq!(incoming.len(), 1);
        assert!((incoming[0].color.x - 1.0).abs() < 1e-6);
        assert!((incoming[0].color.y - 0.8).abs() < 1e-6);
        assert!((incoming[0].color.z - 0.4).abs() < 1e-6);
        assert_eq!(incoming[0].radius, 30.0);
        assert!((incoming[0].intensity - 240.3).abs() < 1e-3);
    }
}
