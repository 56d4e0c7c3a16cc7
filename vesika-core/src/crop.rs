//! Bounded crop solver.
//!
//! Turns "a crop of this size, centered on this anchor, with this much room
//! above it" into a rectangle that always lies inside the source image. Each
//! phase is a fallback for the previous one:
//!
//! 1. take the desired size as-is,
//! 2. uniformly downscale it if it exceeds the image in either axis,
//! 3. translate (never rescale) a positioned rectangle back inside the image,
//! 4. as a last resort rescale again and clamp, with a 1px floor.

use log::debug;
use serde::Serialize;

use crate::geometry::CropRect;

/// What the caller asked for, in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRequest {
    pub desired_width: f64,
    pub desired_height: f64,
    /// Horizontal center of the crop.
    pub anchor_x: f64,
    /// Row the top padding is measured from (usually the face or head top).
    pub anchor_top_y: f64,
    /// Fraction of the crop height left above `anchor_top_y`.
    pub top_padding: f64,
}

/// Which phase produced the final rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CropResolution {
    /// Desired size and position fit as-is.
    AsRequested,
    /// Size was reduced to fit the image; position needed no translation.
    Downscaled,
    /// Rectangle was shifted inside the image (size may also have been reduced).
    Translated,
    /// Translation could not fit; rescaled and clamped.
    Rescaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropOutcome {
    pub rect: CropRect,
    pub resolution: CropResolution,
    /// Effective size relative to the request; below 1.0 the subject comes out smaller.
    pub scale: f64,
}

/// Signed working rectangle used while the solver may still be out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
}

impl Span {
    fn fits(&self, img_w: i64, img_h: i64) -> bool {
        self.x1 >= 0 && self.y1 >= 0 && self.x2 <= img_w && self.y2 <= img_h
    }

    fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    fn height(&self) -> i64 {
        self.y2 - self.y1
    }
}

/// Compute a crop rectangle inside `img_w` × `img_h` for `req`.
///
/// Never fails: degenerate requests degrade to a smaller (or full-image)
/// rectangle, and the result always satisfies `0 <= x1 < x2 <= img_w` and
/// `0 <= y1 < y2 <= img_h` for a non-empty image.
pub fn solve(img_w: u32, img_h: u32, req: &CropRequest) -> CropOutcome {
    let (iw, ih) = (img_w.max(1) as f64, img_h.max(1) as f64);

    // Phase 1: desired size. Nonsense sizes fall back to the whole image.
    let (mut crop_w, mut crop_h) = (req.desired_width, req.desired_height);
    if !(crop_w.is_finite() && crop_h.is_finite() && crop_w > 0.0 && crop_h > 0.0) {
        crop_w = iw;
        crop_h = ih;
    }
    let requested_w = crop_w;

    // Phase 2: uniform downscale when oversized.
    let mut downscaled = false;
    if crop_w > iw || crop_h > ih {
        let s = (iw / crop_w).min(ih / crop_h);
        crop_w *= s;
        crop_h *= s;
        downscaled = true;
        debug!("crop oversized, downscaled by {s:.4} to {crop_w:.1}x{crop_h:.1}");
    }

    let size = (round_px(crop_w), round_px(crop_h));
    let positioned = position(size, req);

    // Phase 3: translate inside bounds.
    let translated = translate_inside(positioned, img_w as i64, img_h as i64);
    if translated.fits(img_w as i64, img_h as i64) {
        let resolution = if translated != positioned {
            CropResolution::Translated
        } else if downscaled {
            CropResolution::Downscaled
        } else {
            CropResolution::AsRequested
        };
        debug!("crop resolved ({resolution:?}): {translated:?}");
        return CropOutcome {
            rect: to_rect(translated),
            resolution,
            scale: translated.width() as f64 / requested_w,
        };
    }

    // Phase 4: rescale and clamp.
    let rect = rescale_into_bounds(img_w, img_h, translated, req);
    debug!("crop forced into bounds by rescale: {rect:?}");
    CropOutcome {
        rect,
        resolution: CropResolution::Rescaled,
        scale: rect.width() as f64 / requested_w,
    }
}

/// Far enough outside any `u32` image that translation still moves the span
/// fully inside, small enough that `x1 + w` cannot overflow.
const COORD_LIMIT: f64 = 1e15;

fn clamp_coord(v: f64) -> i64 {
    v.round().clamp(-COORD_LIMIT, COORD_LIMIT) as i64
}

fn round_px(v: f64) -> i64 {
    (v.round() as i64).max(1)
}

/// Center horizontally on the anchor, leave `top_padding * height` above the anchor row.
fn position((w, h): (i64, i64), req: &CropRequest) -> Span {
    let anchor_x = if req.anchor_x.is_finite() { req.anchor_x } else { 0.0 };
    let anchor_y = if req.anchor_top_y.is_finite() {
        req.anchor_top_y
    } else {
        0.0
    };
    let padding = if req.top_padding.is_finite() {
        req.top_padding
    } else {
        0.0
    };
    let x1 = clamp_coord(anchor_x - w as f64 / 2.0);
    let y1 = clamp_coord(anchor_y - padding * h as f64);
    Span {
        x1,
        y1,
        x2: x1 + w,
        y2: y1 + h,
    }
}

/// Pure translation: keeps width and height, so the aspect ratio is untouched.
fn translate_inside(mut span: Span, img_w: i64, img_h: i64) -> Span {
    if span.x1 < 0 {
        span.x2 -= span.x1;
        span.x1 = 0;
    }
    if span.x2 > img_w {
        let over = span.x2 - img_w;
        span.x1 -= over;
        span.x2 = img_w;
    }
    if span.y1 < 0 {
        span.y2 -= span.y1;
        span.y1 = 0;
    }
    if span.y2 > img_h {
        let over = span.y2 - img_h;
        span.y1 -= over;
        span.y2 = img_h;
    }
    span
}

/// Phase 4: shrink by `min(img_w/w, img_h/h, 1)`, reposition, then clamp each
/// coordinate. Guarantees at least a 1×1 rectangle inside a non-empty image.
fn rescale_into_bounds(img_w: u32, img_h: u32, span: Span, req: &CropRequest) -> CropRect {
    let (iw, ih) = (img_w.max(1) as i64, img_h.max(1) as i64);
    let (w, h) = (span.width().max(1) as f64, span.height().max(1) as f64);
    let s = (iw as f64 / w).min(ih as f64 / h).min(1.0);
    let size = (round_px(w * s), round_px(h * s));
    let moved = translate_inside(position(size, req), iw, ih);

    let x1 = moved.x1.clamp(0, iw - 1);
    let y1 = moved.y1.clamp(0, ih - 1);
    let x2 = moved.x2.min(iw).max(x1 + 1);
    let y2 = moved.y2.min(ih).max(y1 + 1);
    CropRect {
        x1: x1 as u32,
        y1: y1 as u32,
        x2: x2 as u32,
        y2: y2 as u32,
    }
}

fn to_rect(span: Span) -> CropRect {
    CropRect {
        x1: span.x1 as u32,
        y1: span.y1 as u32,
        x2: span.x2 as u32,
        y2: span.y2 as u32,
    }
}
