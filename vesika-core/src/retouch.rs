//! Mild "natural" retouch applied to a finished page.

use image::{Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Retouch {
    pub brightness: f32,
    /// Contrast factor around the mean luminance of the image.
    pub contrast: f32,
    pub unsharp_sigma: f32,
    pub unsharp_amount: f32,
    pub saturation: f32,
}

impl Default for Retouch {
    fn default() -> Self {
        Self {
            brightness: 1.01,
            contrast: 1.03,
            unsharp_sigma: 0.3,
            unsharp_amount: 0.2,
            saturation: 1.05,
        }
    }
}

#[inline]
fn luma(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn map_channels(img: &RgbImage, f: impl Fn(&Rgb<u8>, f32) -> f32) -> RgbImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let src = *p;
        for c in 0..3 {
            p[c] = to_u8(f(&src, src[c] as f32));
        }
    }
    out
}

pub fn brightness(img: &RgbImage, factor: f32) -> RgbImage {
    map_channels(img, |_, v| v * factor)
}

pub fn contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let n = (img.width() as f64 * img.height() as f64).max(1.0);
    let mean = (img.pixels().map(|p| luma(p) as f64).sum::<f64>() / n).round() as f32;
    map_channels(img, |_, v| mean + (v - mean) * factor)
}

pub fn saturation(img: &RgbImage, factor: f32) -> RgbImage {
    map_channels(img, |p, v| {
        let gray = luma(p);
        gray + (v - gray) * factor
    })
}

pub fn unsharp(img: &RgbImage, sigma: f32, amount: f32) -> RgbImage {
    if sigma <= 0.0 || amount == 0.0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let blurred = gaussian_blur_f32(img, sigma);
    let mut out = img.clone();
    for (p, b) in out.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            let v = p[c] as f32;
            p[c] = to_u8(v + amount * (v - b[c] as f32));
        }
    }
    out
}

impl Retouch {
    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        debug!("retouching {}x{} with {:?}", img.width(), img.height(), self);
        let out = brightness(img, self.brightness);
        let out = contrast(&out, self.contrast);
        let out = unsharp(&out, self.unsharp_sigma, self.unsharp_amount);
        saturation(&out, self.saturation)
    }
}
