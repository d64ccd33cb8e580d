// THEORY:
// This file is the main entry point for the `lumen_sync` library crate. It
// exposes the two halves of the system as separate top-level APIs:
//
// - The estimating side: `pipeline::EstimationPipeline` turns one camera frame
//   into a ranked `LightBatch`, and `parallel_pipeline::EstimationWorker` runs
//   it off the capture path at a bounded rate.
// - The renderer side: `core_modules::tracker::LightTracker` keeps a stable
//   set of scene lights in step with incoming batches.
//
// `transport` connects the two, `config` and `error` are shared by both. The
// image primitives in `core_modules` are public for tooling and tests but are
// not needed to drive either side.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod transport;

pub use config::SessionConfig;
pub use core_modules::observation::{IncomingLight, LightBatch, LightObservation};
pub use core_modules::scene::{LightHandle, LightKind, LightState, SceneAdapter, SceneGraph};
pub use core_modules::tracker::{LightDecision, LightTracker, ReconcileReport};
pub use pipeline::EstimationPipeline;
