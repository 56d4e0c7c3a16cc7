pub mod config;
pub mod export;

// Re-export core types for convenience
pub use vesika_core::{
    layout, pipeline, AlphaMatte, AnchorPoint, BoundingBox, Job, LayoutKind, Output, Pipeline,
    PhotoKind,
};
