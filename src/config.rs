use anyhow::{Context, Result};
use directories::ProjectDirs;
use image::Rgb;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vesika_core::{matte::RefineOptions, retouch::Retouch, Pipeline, Refinement};

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("VESIKA_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    ProjectDirs::from("", "", "vesika")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("vesika.toml"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dpi: u32,
    pub jpeg_quality: u8,
    pub background: [u8; 3],
    pub feather_radius: u32,
    /// Snap near-transparent and near-opaque matte values before refinement.
    pub sharpen_matte: bool,
    pub retouch: bool,
    pub passport_face_scale: f64,
    pub passport_top_padding: f64,
    pub refine: Refinement,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dpi: 300,
            jpeg_quality: 100,
            background: [255, 255, 255],
            feather_radius: 2,
            sharpen_matte: false,
            retouch: false,
            passport_face_scale: 2.0,
            passport_top_padding: 0.25,
            refine: Refinement::default(),
        }
    }
}

impl Config {
    pub fn pipeline(&self) -> Pipeline {
        Pipeline {
            dpi: self.dpi.max(1),
            background: Rgb(self.background),
            refine: RefineOptions {
                sharpen: self.sharpen_matte.then_some((0.05, 0.95)),
                refinement: self.refine,
                feather_radius: self.feather_radius,
            },
            face_scale: self.passport_face_scale,
            top_padding: self.passport_top_padding,
            retouch: self.retouch.then(Retouch::default),
            ..Pipeline::default()
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
