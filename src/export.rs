use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use image::{
    codecs::jpeg::{JpegEncoder, PixelDensity},
    RgbImage,
};

/// Encode `img` as JPEG with the print resolution recorded in the JFIF header.
pub fn encode_jpeg<W: Write>(img: &RgbImage, out: W, quality: u8, dpi: u32) -> Result<()> {
    let mut encoder = JpegEncoder::new_with_quality(out, quality.clamp(1, 100));
    encoder.set_pixel_density(PixelDensity::dpi(dpi.min(u16::MAX as u32) as u16));
    encoder.encode_image(img).context("encoding jpeg")
}

pub fn write_jpeg(img: &RgbImage, path: &Path, quality: u8, dpi: u32) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    encode_jpeg(img, &mut writer, quality, dpi)?;
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))
}
