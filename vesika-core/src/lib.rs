pub mod composite;
pub mod crop;
pub mod error;
pub mod face;
pub mod geometry;
pub mod head;
pub mod layout;
pub mod matte;
pub mod pipeline;
pub mod retouch;
pub mod units;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use face::{FaceDetector, HeadTopSearch};
pub use geometry::{AnchorPoint, BoundingBox, CropRect};
pub use layout::{LayoutKind, LayoutSpec};
pub use matte::{AlphaMatte, RefineOptions, Refinement};
pub use pipeline::{Job, Output, Pipeline, PhotoKind, Report};
