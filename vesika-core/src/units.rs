//! Physical length to pixel conversion at a fixed DPI.
//!
//! Every downstream geometry value goes through [`to_pixels`], so the rounding
//! policy lives here and nowhere else: nearest integer, never truncation.

use serde::{Deserialize, Serialize};

/// Print resolution used by every preset unless the caller overrides it.
pub const DEFAULT_DPI: u32 = 300;

const MM_PER_INCH: f64 = 25.4;
const CM_PER_INCH: f64 = 2.54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Mm,
    Cm,
    Inch,
}

impl Unit {
    fn per_inch(self) -> f64 {
        match self {
            Unit::Mm => MM_PER_INCH,
            Unit::Cm => CM_PER_INCH,
            Unit::Inch => 1.0,
        }
    }
}

/// A physical length tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub value: f64,
    pub unit: Unit,
}

impl Dimension {
    pub const fn mm(value: f64) -> Self {
        Self { value, unit: Unit::Mm }
    }

    pub const fn cm(value: f64) -> Self {
        Self { value, unit: Unit::Cm }
    }

    pub fn inches(&self) -> f64 {
        self.value / self.unit.per_inch()
    }

    /// `round(inches * dpi)`.
    pub fn to_pixels(&self, dpi: u32) -> i64 {
        (self.inches() * dpi as f64).round() as i64
    }
}

/// Convert a physical length to a pixel count: `round(value_in_inch * dpi)`.
pub fn to_pixels(value: f64, unit: Unit, dpi: u32) -> i64 {
    Dimension { value, unit }.to_pixels(dpi)
}
