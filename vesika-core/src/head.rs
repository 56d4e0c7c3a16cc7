//! Head-metric scaler.
//!
//! Scales the whole source so the measured head-top → chin distance matches a
//! physical length, then places it on a fixed canvas with the head top a fixed
//! margin below the canvas edge and the face centered horizontally.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use log::debug;
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::geometry::{AnchorPoint, BoundingBox};
use crate::units::Dimension;

/// Anything shorter than this cannot produce a meaningful scale.
const MIN_HEAD_TO_CHIN_PX: f64 = 1.0;

/// A head needing more than this much enlargement is a misdetection, not a
/// small face.
const MAX_SCALE: f64 = 16.0;

/// Extra source pixels kept around the window for the Lanczos3 support.
const RESAMPLE_MARGIN: u32 = 3;

/// Canvas and head geometry the output must satisfy, in working-DPI pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadTarget {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub head_to_chin_px: f64,
    pub top_margin_px: f64,
}

impl HeadTarget {
    /// 5×6 cm canvas, 43 mm from head top to chin, head top 5 mm below the edge.
    pub fn biometric(dpi: u32) -> Self {
        Self {
            canvas_width: Dimension::cm(5.0).to_pixels(dpi).max(1) as u32,
            canvas_height: Dimension::cm(6.0).to_pixels(dpi).max(1) as u32,
            head_to_chin_px: Dimension::mm(43.0).to_pixels(dpi) as f64,
            top_margin_px: Dimension::mm(5.0).to_pixels(dpi) as f64,
        }
    }
}

/// Reference points measured on the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadMeasurement {
    pub face_center_x: f64,
    pub head_top: AnchorPoint,
    pub chin: AnchorPoint,
}

impl HeadMeasurement {
    /// Chin is approximated by the bottom of the face box.
    pub fn from_face(face: &BoundingBox, head_top: AnchorPoint) -> Self {
        Self {
            face_center_x: face.center_x(),
            head_top,
            chin: face.chin(),
        }
    }

    pub fn head_to_chin(&self) -> f64 {
        self.chin.y - self.head_top.y
    }
}

/// Matching source and destination regions; both sides have the same extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub src_x: u32,
    pub src_y: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadPlacement {
    pub scale: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: i64,
    pub offset_y: i64,
    /// Head top and chin after scaling and offset, in canvas coordinates.
    pub head_top: AnchorPoint,
    pub chin: AnchorPoint,
    /// `None` when the scaled image misses the canvas entirely.
    pub window: Option<Window>,
}

/// `target / (chin - head_top)`, or `DegenerateMeasurement` when that distance
/// is under a pixel, not finite, the head top sits below the chin, or the
/// resulting scale exceeds `MAX_SCALE`.
pub fn scale_factor(m: &HeadMeasurement, target: &HeadTarget) -> Result<f64> {
    let distance = m.head_to_chin();
    let degenerate = CoreError::DegenerateMeasurement {
        head_to_chin_px: distance.abs(),
    };
    if !distance.is_finite() || distance < MIN_HEAD_TO_CHIN_PX {
        return Err(degenerate);
    }
    let scale = target.head_to_chin_px / distance;
    if !scale.is_finite() || scale > MAX_SCALE {
        debug!("head scale {scale:.2} exceeds {MAX_SCALE}");
        return Err(degenerate);
    }
    Ok(scale)
}

fn scaled_len(len: u32, scale: f64) -> u32 {
    (len as f64 * scale).round().clamp(1.0, u32::MAX as f64) as u32
}

/// Plan the scale, offsets, and the copied window without touching pixels.
pub fn plan(img_w: u32, img_h: u32, m: &HeadMeasurement, target: &HeadTarget) -> Result<HeadPlacement> {
    let scale = scale_factor(m, target)?;
    let scaled_width = scaled_len(img_w, scale);
    let scaled_height = scaled_len(img_h, scale);

    let center_x = (m.face_center_x * scale).round() as i64;
    let head_top_y = (m.head_top.y * scale).round() as i64;
    let offset_x = (target.canvas_width / 2) as i64 - center_x;
    let offset_y = target.top_margin_px.round() as i64 - head_top_y;

    let window = visible_window(
        (scaled_width, scaled_height),
        (target.canvas_width, target.canvas_height),
        (offset_x, offset_y),
    );
    debug!(
        "head scale {scale:.4}: scaled {scaled_width}x{scaled_height}, offset ({offset_x}, {offset_y}), window {window:?}"
    );

    let to_canvas = |p: AnchorPoint| {
        let s = p.scaled(scale);
        AnchorPoint::new(s.x.round() + offset_x as f64, s.y.round() + offset_y as f64)
    };
    Ok(HeadPlacement {
        scale,
        scaled_width,
        scaled_height,
        offset_x,
        offset_y,
        head_top: to_canvas(m.head_top),
        chin: to_canvas(m.chin),
        window,
    })
}

/// Intersect the scaled image (placed at `offset`) with the canvas, clamping
/// source and destination together so the copied and pasted extents match.
pub fn visible_window(scaled: (u32, u32), canvas: (u32, u32), offset: (i64, i64)) -> Option<Window> {
    let (x_src, x_dst, width) = axis_window(scaled.0 as i64, canvas.0 as i64, offset.0)?;
    let (y_src, y_dst, height) = axis_window(scaled.1 as i64, canvas.1 as i64, offset.1)?;
    Some(Window {
        src_x: x_src as u32,
        src_y: y_src as u32,
        dst_x: x_dst as u32,
        dst_y: y_dst as u32,
        width: width as u32,
        height: height as u32,
    })
}

fn axis_window(src_len: i64, dst_len: i64, offset: i64) -> Option<(i64, i64, i64)> {
    let src1 = (-offset).max(0);
    let dst1 = offset.max(0);
    let src2 = src_len.min(src1 + dst_len);
    let dst2 = dst_len.min(dst1 + (src2 - src1));
    let len = dst2 - dst1;
    (len > 0 && src1 < src_len).then_some((src1, dst1, len))
}

/// Source span `[start, end)` covering scaled span `[from, from + len)`, plus
/// the scaled coordinate where that source span begins.
fn source_span(from: u32, len: u32, src_len: u32, scale: f64) -> (u32, u32, u32) {
    let start = ((from as f64 / scale).floor() as u32)
        .saturating_sub(RESAMPLE_MARGIN)
        .min(src_len.saturating_sub(1));
    let end = ((from.saturating_add(len) as f64 / scale).ceil() as u32)
        .saturating_add(RESAMPLE_MARGIN)
        .clamp(start + 1, src_len.max(start + 1));
    let scaled_start = (start as f64 * scale).round() as u32;
    (start, end, scaled_start)
}

/// Resample the part of `img` that lands in the visible window and paste it
/// onto a fresh canvas filled with `background`.
///
/// Only the window's source region is resized, so memory stays proportional
/// to the canvas rather than to the full scaled image.
pub fn render(img: &RgbImage, placement: &HeadPlacement, target: &HeadTarget, background: Rgb<u8>) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(target.canvas_width, target.canvas_height, background);
    let Some(win) = placement.window else {
        return canvas;
    };
    if img.width() == 0 || img.height() == 0 {
        return canvas;
    }
    let scale = placement.scale;
    let (x0, x1, sx0) = source_span(win.src_x, win.width, img.width(), scale);
    let (y0, y1, sy0) = source_span(win.src_y, win.height, img.height(), scale);
    let region = imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image();
    let region_w = scaled_len(x1, scale).saturating_sub(sx0).max(1);
    let region_h = scaled_len(y1, scale).saturating_sub(sy0).max(1);
    let scaled = imageops::resize(&region, region_w, region_h, FilterType::Lanczos3);

    let patch = imageops::crop_imm(
        &scaled,
        win.src_x.saturating_sub(sx0),
        win.src_y.saturating_sub(sy0),
        win.width,
        win.height,
    )
    .to_image();
    imageops::replace(&mut canvas, &patch, win.dst_x as i64, win.dst_y as i64);
    canvas
}

/// Plan and render in one step.
pub fn normalize(
    img: &RgbImage,
    m: &HeadMeasurement,
    target: &HeadTarget,
    background: Rgb<u8>,
) -> Result<(RgbImage, HeadPlacement)> {
    let placement = plan(img.width(), img.height(), m, target)?;
    Ok((render(img, &placement, target, background), placement))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(center_x: f64, top_y: f64, chin_y: f64) -> HeadMeasurement {
        HeadMeasurement {
            face_center_x: center_x,
            head_top: AnchorPoint::new(center_x, top_y),
            chin: AnchorPoint::new(center_x, chin_y),
        }
    }

    #[test]
    fn biometric_target_at_300_dpi() {
        let t = HeadTarget::biometric(300);
        assert_eq!((t.canvas_width, t.canvas_height), (591, 709));
        assert_eq!(t.head_to_chin_px, 508.0);
        assert_eq!(t.top_margin_px, 59.0);
    }

    #[test]
    fn zero_distance_is_degenerate() {
        let err = scale_factor(&measurement(100.0, 500.0, 500.0), &HeadTarget::biometric(300));
        assert!(matches!(err, Err(CoreError::DegenerateMeasurement { .. })));
    }

    #[test]
    fn inverted_head_is_degenerate() {
        let err = scale_factor(&measurement(100.0, 600.0, 500.0), &HeadTarget::biometric(300));
        assert!(matches!(err, Err(CoreError::DegenerateMeasurement { .. })));
    }

    #[test]
    fn scale_maps_distance_to_target() {
        let s = scale_factor(&measurement(100.0, 100.0, 354.0), &HeadTarget::biometric(300)).unwrap();
        assert!((s - 2.0).abs() < 1e-12);
    }

    #[test]
    fn implausible_enlargement_is_degenerate() {
        // A 12px face box: estimated head top 4.8px above it, 16.8px to the chin.
        let err = scale_factor(&measurement(2000.0, 1495.2, 1512.0), &HeadTarget::biometric(300));
        assert!(matches!(err, Err(CoreError::DegenerateMeasurement { .. })));
        let err = plan(4000, 3000, &measurement(2000.0, 1495.2, 1512.0), &HeadTarget::biometric(300));
        assert!(err.is_err());
    }

    #[test]
    fn large_scale_renders_only_the_window() {
        // Scale 10.16 would make the full source about 20000x15000.
        let img = RgbImage::from_fn(2000, 1500, |_, y| {
            if y < 500 {
                Rgb([255, 255, 255])
            } else {
                Rgb([30, 30, 30])
            }
        });
        let target = HeadTarget::biometric(300);
        let m = measurement(1000.0, 500.0, 550.0);
        let (canvas, p) = normalize(&img, &m, &target, Rgb([0, 0, 255])).unwrap();
        assert!((p.scale - 10.16).abs() < 1e-9);
        assert_eq!(canvas.dimensions(), (591, 709));
        assert_eq!(p.head_top.y, 59.0);
        assert_eq!(*canvas.get_pixel(295, 10), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(295, 120), Rgb([30, 30, 30]));
    }

    #[test]
    fn planned_head_lands_on_margin() {
        let target = HeadTarget::biometric(300);
        let m = measurement(400.0, 200.0, 708.0);
        let p = plan(800, 1000, &m, &target).unwrap();
        assert!((p.scale - 1.0).abs() < 1e-12);
        assert_eq!(p.head_top.y, 59.0);
        assert_eq!(p.chin.y - p.head_top.y, 508.0);
        assert_eq!(p.head_top.x, (591 / 2) as f64);
    }

    #[test]
    fn window_clamps_both_sides() {
        // Scaled image starts 100px left of and 30px below the canvas origin.
        let w = visible_window((500, 400), (300, 350), (-100, 30)).unwrap();
        assert_eq!((w.src_x, w.dst_x, w.width), (100, 0, 300));
        assert_eq!((w.src_y, w.dst_y, w.height), (0, 30, 320));
    }

    #[test]
    fn window_small_image_inside_canvas() {
        let w = visible_window((50, 40), (300, 350), (10, 20)).unwrap();
        assert_eq!((w.src_x, w.src_y, w.dst_x, w.dst_y), (0, 0, 10, 20));
        assert_eq!((w.width, w.height), (50, 40));
    }

    #[test]
    fn window_misses_canvas() {
        assert!(visible_window((50, 40), (300, 350), (400, 0)).is_none());
        assert!(visible_window((50, 40), (300, 350), (-60, 0)).is_none());
    }

    #[test]
    fn render_fills_background_outside_window() {
        let img = RgbImage::from_pixel(600, 800, Rgb([10, 20, 30]));
        let target = HeadTarget::biometric(300);
        // Head top near the image top: scaled image begins below the canvas top.
        let m = measurement(300.0, 0.0, 508.0);
        let (canvas, p) = normalize(&img, &m, &target, Rgb([255, 255, 255])).unwrap();
        assert_eq!(canvas.dimensions(), (591, 709));
        assert_eq!(p.offset_y, 59);
        assert_eq!(*canvas.get_pixel(295, 10), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(295, 300), Rgb([10, 20, 30]));
    }
}
