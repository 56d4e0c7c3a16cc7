use image::{Rgb, RgbImage};

use crate::matte::{sanitize, AlphaMatte};

/// `alpha * foreground + (1 - alpha) * background` per channel.
///
/// A matte at another resolution is resized to the foreground first.
pub fn composite(foreground: &RgbImage, matte: &AlphaMatte, background: Rgb<u8>) -> RgbImage {
    let (w, h) = foreground.dimensions();
    let resized;
    let matte = if (matte.width(), matte.height()) == (w, h) {
        matte
    } else {
        resized = matte.resize(w, h);
        &resized
    };

    RgbImage::from_fn(w, h, |x, y| {
        let alpha = sanitize(matte.get(x, y));
        let fg = foreground.get_pixel(x, y);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = alpha * fg[c] as f32 + (1.0 - alpha) * background[c] as f32;
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}
