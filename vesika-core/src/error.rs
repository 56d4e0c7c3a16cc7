use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Head-top to chin distance is too small to derive a scale from.
    /// Callers should fall back to the bounded crop using the face box alone.
    #[error("degenerate head measurement: head-to-chin distance is {head_to_chin_px:.2}px")]
    DegenerateMeasurement { head_to_chin_px: f64 },

    #[error("matte has {actual} values, expected {expected}")]
    MatteShape { expected: usize, actual: usize },

    #[error("unknown layout: {0}")]
    UnknownLayout(String),

    #[error("unknown photo kind: {0}")]
    UnknownPhotoKind(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
