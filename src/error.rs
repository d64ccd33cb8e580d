// THEORY:
// Errors are split by the component that owns them. Per-cycle problems
// (a malformed batch, a degenerate blob) never surface here as fatal values;
// they are logged and skipped where they happen. What remains are the
// failures a caller must act on: bad configuration at startup, a listener
// that cannot bind, a frame that cannot be read.

use std::io;
use thiserror::Error;

/// Startup and configuration failures. Fatal for the subsystem being built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no directional light is registered in the scene")]
    MissingDirectionalLight,

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("circularity band is inverted: min {min} > max {max}")]
    InvertedCircularityBand { min: f64, max: f64 },

    #[error("field of view must lie in (0, 180) degrees, got {0}")]
    FieldOfView(f64),
}

/// Failures of the observation transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed light batch: {0}")]
    Malformed(String),

    #[error("batch carries {0} lights, at most 8 are allowed")]
    TooManyLights(usize),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Malformed(err.to_string())
    }
}

/// Failures on the estimating side that stop a single frame.
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("frame is empty ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("estimation worker has shut down")]
    WorkerClosed,
}

pub type TransportResult<T> = Result<T, TransportError>;
