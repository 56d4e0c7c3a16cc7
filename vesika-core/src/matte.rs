//! Alpha matte and edge refinement.
//!
//! Every constructor and transform clamps into `[0, 1]` (NaN becomes 0), so no
//! out-of-range value can reach the compositor.

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::{
    distance_transform::euclidean_squared_distance_transform, edges::canny,
    filter::gaussian_blur_f32,
};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Values this close to 0 or 1 are snapped, so flat regions stay exactly flat
/// after float blurs.
const SNAP_EPSILON: f32 = 1e-6;

const EDGE_LOW_THRESHOLD: f32 = 50.0;
const EDGE_HIGH_THRESHOLD: f32 = 150.0;

#[inline]
pub fn sanitize(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[inline]
fn snap(v: f32) -> f32 {
    let v = sanitize(v);
    if v < SNAP_EPSILON {
        0.0
    } else if v > 1.0 - SNAP_EPSILON {
        1.0
    } else {
        v
    }
}

/// Per-pixel foreground opacity, indexed `[row, column]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMatte {
    data: Array2<f32>,
}

impl AlphaMatte {
    /// Build from row-major values. Out-of-range values are clamped, NaN becomes 0.
    pub fn from_raw(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(CoreError::MatteShape {
                expected,
                actual: values.len(),
            });
        }
        let data = Array2::from_shape_vec((height as usize, width as usize), values)
            .map_err(|_| CoreError::MatteShape {
                expected,
                actual: expected,
            })?;
        Ok(Self::from_array(data))
    }

    pub fn from_array(mut data: Array2<f32>) -> Self {
        data.mapv_inplace(sanitize);
        Self { data }
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            data: Array2::from_elem((height as usize, width as usize), sanitize(value)),
        }
    }

    /// Interpret an 8-bit mask (255 = foreground) as a matte.
    pub fn from_luma(mask: &GrayImage) -> Self {
        let (w, h) = mask.dimensions();
        let data = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            mask.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
        });
        Self { data }
    }

    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([(self.get(x, y) * 255.0).round() as u8])
        })
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[[y as usize, x as usize]]
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.data
    }

    fn to_f32_image(&self) -> ImageBuffer<Luma<f32>, Vec<f32>> {
        ImageBuffer::from_fn(self.width(), self.height(), |x, y| Luma([self.get(x, y)]))
    }

    /// Bilinear resize with pixel-center alignment. No area averaging, so
    /// edges do not pick up a halo when the matte is scaled back up.
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if (width, height) == (self.width(), self.height()) {
            return self.clone();
        }
        let (src_w, src_h) = (self.data.ncols(), self.data.nrows());
        let (dst_w, dst_h) = (width.max(1) as usize, height.max(1) as usize);
        if src_w == 0 || src_h == 0 {
            return Self::filled(dst_w as u32, dst_h as u32, 0.0);
        }
        let sx = src_w as f32 / dst_w as f32;
        let sy = src_h as f32 / dst_h as f32;

        let sample = |pos: f32, len: usize| {
            let p = pos.clamp(0.0, (len - 1) as f32);
            let i0 = p.floor() as usize;
            let i1 = (i0 + 1).min(len - 1);
            (i0, i1, p - i0 as f32)
        };

        let data = Array2::from_shape_fn((dst_h, dst_w), |(y, x)| {
            let (y0, y1, fy) = sample((y as f32 + 0.5) * sy - 0.5, src_h);
            let (x0, x1, fx) = sample((x as f32 + 0.5) * sx - 0.5, src_w);
            let top = self.data[[y0, x0]] * (1.0 - fx) + self.data[[y0, x1]] * fx;
            let bottom = self.data[[y1, x0]] * (1.0 - fx) + self.data[[y1, x1]] * fx;
            sanitize(top * (1.0 - fy) + bottom * fy)
        });
        Self { data }
    }

    /// Snap near-background to 0 and near-foreground to 1.
    pub fn sharpen(&self, low: f32, high: f32) -> Self {
        let data = self.data.mapv(|a| {
            if a < low {
                0.0
            } else if a > high {
                1.0
            } else {
                a
            }
        });
        Self { data }
    }

    /// Guided filter with the grayscale source as guide: smooths flat regions
    /// while following edges present in the photo.
    pub fn guided_filter(&self, guide: &GrayImage, radius: u32, eps: f32) -> Self {
        let (w, h) = (self.data.ncols(), self.data.nrows());
        if guide.dimensions() != (self.width(), self.height()) || radius == 0 {
            return self.clone();
        }
        let r = radius as usize;
        let eps = eps as f64;
        let i = Array2::from_shape_fn((h, w), |(y, x)| {
            guide.get_pixel(x as u32, y as u32)[0] as f64 / 255.0
        });
        let p = self.data.mapv(|v| v as f64);

        let mean_i = box_mean(&i, r);
        let mean_p = box_mean(&p, r);
        let corr_ii = box_mean(&(&i * &i), r);
        let corr_ip = box_mean(&(&i * &p), r);

        let var_i = &corr_ii - &(&mean_i * &mean_i);
        let cov_ip = &corr_ip - &(&mean_i * &mean_p);
        let a = &cov_ip / &var_i.mapv(|v| v + eps);
        let b = &mean_p - &(&a * &mean_i);

        let q = &box_mean(&a, r) * &i + &box_mean(&b, r);
        Self {
            data: q.mapv(|v| snap(v as f32)),
        }
    }

    /// Edge-preserving smoothing of the matte itself, used when no guide is wanted.
    pub fn bilateral(&self, radius: u32, sigma_color: f32, sigma_space: f32) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let (w, h) = (self.data.ncols() as i64, self.data.nrows() as i64);
        let r = radius as i64;
        let space_denom = 2.0 * sigma_space * sigma_space;
        let color_denom = 2.0 * sigma_color * sigma_color;
        let spatial: Vec<f32> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx * dx + dy * dy) as f32))
            .map(|d2| (-d2 / space_denom).exp())
            .collect();

        let data = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            let center = self.data[[y, x]];
            let (mut acc, mut norm) = (0.0f32, 0.0f32);
            for dy in -r..=r {
                let yy = (y as i64 + dy).clamp(0, h - 1) as usize;
                for dx in -r..=r {
                    let xx = (x as i64 + dx).clamp(0, w - 1) as usize;
                    let v = self.data[[yy, xx]];
                    let diff = v - center;
                    let k = spatial[((dy + r) * (2 * r + 1) + dx + r) as usize]
                        * (-(diff * diff) / color_denom).exp();
                    acc += k * v;
                    norm += k;
                }
            }
            snap(if norm > 0.0 { acc / norm } else { center })
        });
        Self { data }
    }

    /// Soften the matte only in a narrow band around its edges.
    ///
    /// Canny edges of `alpha * 255` give the boundary; each pixel blends the
    /// Gaussian-blurred matte with the original by
    /// `clip(1 - distance / (3 * radius), 0, 1)`, so pixels farther than
    /// `3 * radius` from an edge keep their value exactly.
    pub fn feather(&self, radius: u32) -> Self {
        if radius == 0 || self.data.is_empty() {
            return self.clone();
        }
        let edges = canny(&self.to_luma(), EDGE_LOW_THRESHOLD, EDGE_HIGH_THRESHOLD);
        if !edges.pixels().any(|p| p[0] > 0) {
            debug!("feather: no matte edges, leaving matte untouched");
            return self.clone();
        }
        let distance = euclidean_squared_distance_transform(&edges);
        let blurred = gaussian_blur_f32(&self.to_f32_image(), (radius as f32 / 2.0).max(0.5));
        let band = 3.0 * radius as f64;

        let data = Array2::from_shape_fn(self.data.raw_dim(), |(y, x)| {
            let alpha = self.data[[y, x]];
            let d = distance.get_pixel(x as u32, y as u32)[0].sqrt();
            let weight = (1.0 - d / band).clamp(0.0, 1.0) as f32;
            if weight == 0.0 {
                return alpha;
            }
            let soft = blurred.get_pixel(x as u32, y as u32)[0];
            snap(weight * soft + (1.0 - weight) * alpha)
        });
        Self { data }
    }
}

/// Mean over a `(2r+1)²` window, clipped at the borders and normalized by the
/// number of pixels actually covered.
fn box_mean(src: &Array2<f64>, r: usize) -> Array2<f64> {
    let (h, w) = src.dim();
    let mut integral = Array2::<f64>::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut row = 0.0;
        for x in 0..w {
            row += src[[y, x]];
            integral[[y + 1, x + 1]] = integral[[y, x + 1]] + row;
        }
    }
    Array2::from_shape_fn((h, w), |(y, x)| {
        let (y0, y1) = (y.saturating_sub(r), (y + r + 1).min(h));
        let (x0, x1) = (x.saturating_sub(r), (x + r + 1).min(w));
        let sum = integral[[y1, x1]] - integral[[y0, x1]] - integral[[y1, x0]] + integral[[y0, x0]];
        sum / ((y1 - y0) * (x1 - x0)) as f64
    })
}

/// Which edge-aware smoothing to run before feathering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "method")]
pub enum Refinement {
    Guided { radius: u32, eps: f32 },
    Bilateral {
        radius: u32,
        sigma_color: f32,
        sigma_space: f32,
    },
    None,
}

impl Refinement {
    pub fn guided() -> Self {
        Refinement::Guided {
            radius: 8,
            eps: 1e-4,
        }
    }

    pub fn bilateral() -> Self {
        Refinement::Bilateral {
            radius: 4,
            sigma_color: 0.1,
            sigma_space: 3.0,
        }
    }
}

impl Default for Refinement {
    fn default() -> Self {
        Self::guided()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefineOptions {
    /// Optional `(low, high)` thresholds for [`AlphaMatte::sharpen`].
    pub sharpen: Option<(f32, f32)>,
    pub refinement: Refinement,
    /// Feather band radius in pixels; 0 disables feathering.
    pub feather_radius: u32,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            sharpen: None,
            refinement: Refinement::default(),
            feather_radius: 2,
        }
    }
}

/// Bring a model-resolution matte to the source resolution and refine it.
pub fn refine(matte: &AlphaMatte, source: &RgbImage, opts: &RefineOptions) -> AlphaMatte {
    let (w, h) = source.dimensions();
    let mut out = matte.resize(w, h);
    if let Some((low, high)) = opts.sharpen {
        out = out.sharpen(low, high);
    }
    out = match opts.refinement {
        Refinement::Guided { radius, eps } => {
            let guide = image::imageops::grayscale(source);
            out.guided_filter(&guide, radius, eps)
        }
        Refinement::Bilateral {
            radius,
            sigma_color,
            sigma_space,
        } => out.bilateral(radius, sigma_color, sigma_space),
        Refinement::None => out,
    };
    debug!(
        "matte refined at {w}x{h} with {:?}, feather radius {}",
        opts.refinement, opts.feather_radius
    );
    out.feather(opts.feather_radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_range(m: &AlphaMatte) -> bool {
        m.values().iter().all(|v| (0.0..=1.0).contains(v))
    }

    #[test]
    fn from_raw_clamps_and_zeroes_nan() {
        let m = AlphaMatte::from_raw(2, 2, vec![f32::NAN, -3.0, 0.5, 7.0]).unwrap();
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(1, 0), 0.0);
        assert_eq!(m.get(0, 1), 0.5);
        assert_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(matches!(
            AlphaMatte::from_raw(3, 3, vec![0.0; 8]),
            Err(CoreError::MatteShape {
                expected: 9,
                actual: 8
            })
        ));
    }

    #[test]
    fn resize_keeps_flat_values() {
        let m = AlphaMatte::filled(8, 8, 1.0).resize(37, 21);
        assert_eq!((m.width(), m.height()), (37, 21));
        assert!(m.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn resize_interpolates_linearly() {
        let m = AlphaMatte::from_raw(2, 1, vec![0.0, 1.0]).unwrap().resize(4, 1);
        let v: Vec<f32> = m.values().iter().copied().collect();
        assert_eq!(v[0], 0.0);
        assert!((v[1] - 0.25).abs() < 1e-6);
        assert!((v[2] - 0.75).abs() < 1e-6);
        assert_eq!(v[3], 1.0);
    }

    #[test]
    fn sharpen_snaps_extremes() {
        let m = AlphaMatte::from_raw(3, 1, vec![0.03, 0.5, 0.97]).unwrap().sharpen(0.05, 0.95);
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(1, 0), 0.5);
        assert_eq!(m.get(2, 0), 1.0);
    }

    #[test]
    fn box_mean_of_constant_is_constant() {
        let src = Array2::from_elem((5, 7), 0.25);
        let mean = box_mean(&src, 2);
        assert!(mean.iter().all(|v| (v - 0.25).abs() < 1e-12));
    }

    #[test]
    fn guided_filter_stays_in_range() {
        let values: Vec<f32> = (0..400).map(|i| if i % 20 < 10 { 0.0 } else { 1.0 }).collect();
        let m = AlphaMatte::from_raw(20, 20, values).unwrap();
        let guide = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 0 } else { 255 }]));
        let out = m.guided_filter(&guide, 3, 1e-4);
        assert!(in_range(&out));
        // Guide agrees with the matte edge: both sides remain near their values.
        assert!(out.get(2, 10) < 0.05);
        assert!(out.get(17, 10) > 0.95);
    }

    #[test]
    fn bilateral_preserves_step() {
        let values: Vec<f32> = (0..400).map(|i| if i % 20 < 10 { 0.0 } else { 1.0 }).collect();
        let m = AlphaMatte::from_raw(20, 20, values).unwrap();
        let out = m.bilateral(3, 0.1, 2.0);
        assert!(in_range(&out));
        assert!(out.get(9, 5) < 0.01);
        assert!(out.get(10, 5) > 0.99);
    }

    #[test]
    fn feather_without_edges_is_identity() {
        let m = AlphaMatte::filled(16, 16, 1.0);
        assert_eq!(m.feather(2), m);
    }

    #[test]
    fn feather_softens_only_near_boundary() {
        // Zero square in the middle of a one field.
        let (w, h) = (40u32, 40u32);
        let inside = |x: u32, y: u32| (12..28).contains(&x) && (12..28).contains(&y);
        let values: Vec<f32> = (0..h)
            .flat_map(|y| (0..w).map(move |x| if inside(x, y) { 0.0 } else { 1.0 }))
            .collect();
        let m = AlphaMatte::from_raw(w, h, values).unwrap();
        let out = m.feather(2);
        assert!(in_range(&out));

        // Chebyshev distance to the nearest pixel of the opposite value.
        let boundary_distance = |x: u32, y: u32| {
            let own = m.get(x, y);
            let mut best = u32::MAX;
            for v in 0..h {
                for u in 0..w {
                    if m.get(u, v) != own {
                        best = best.min(x.abs_diff(u).max(y.abs_diff(v)));
                    }
                }
            }
            best
        };

        let mut softened = 0;
        for y in 0..h {
            for x in 0..w {
                let v = out.get(x, y);
                if v > 0.0 && v < 1.0 {
                    softened += 1;
                    assert!(boundary_distance(x, y) <= 4, "({x}, {y}) = {v} far from boundary");
                } else if boundary_distance(x, y) > 4 {
                    assert_eq!(v, m.get(x, y), "flat region changed at ({x}, {y})");
                }
            }
        }
        assert!(softened > 0, "feathering produced no soft pixels");
    }
}
