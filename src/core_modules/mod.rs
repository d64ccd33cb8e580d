pub mod blob_detector;
pub mod contour;
pub mod enclosing_circle;
pub mod light_estimator;
pub mod moment;
pub mod observation;
pub mod pixel;
pub mod scene;
pub mod smart_blob;
pub mod threshold;
pub mod tracker;
pub mod utils;
