use std::{fmt, str::FromStr};

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::composite::composite;
use crate::crop::{self, CropOutcome, CropRequest};
use crate::error::{CoreError, Result};
use crate::face::{self, EdgeHeadTopSearch, FaceDetector, HeadTopSearch};
use crate::geometry::{AnchorPoint, BoundingBox};
use crate::head::{self, HeadMeasurement, HeadPlacement, HeadTarget};
use crate::layout::{self, LayoutKind, PagePlan};
use crate::matte::{self, AlphaMatte, RefineOptions};
use crate::retouch::Retouch;
use crate::units::{Dimension, DEFAULT_DPI};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoKind {
    /// 5×6 cm, head scaled to a fixed head-top to chin length.
    Biometric,
    /// 4.5×6 cm, framed around the face box.
    Passport,
    /// Passport framing printed once on a 10×15 cm card.
    Postcard,
}

impl PhotoKind {
    pub const ALL: [PhotoKind; 3] = [PhotoKind::Biometric, PhotoKind::Passport, PhotoKind::Postcard];

    pub fn name(self) -> &'static str {
        match self {
            PhotoKind::Biometric => "biometric",
            PhotoKind::Passport => "passport",
            PhotoKind::Postcard => "postcard",
        }
    }

    /// Single photo size in pixels before page layout.
    pub fn photo_size(self, dpi: u32) -> (u32, u32) {
        let width_cm = match self {
            PhotoKind::Biometric => 5.0,
            PhotoKind::Passport | PhotoKind::Postcard => 4.5,
        };
        (
            Dimension::cm(width_cm).to_pixels(dpi).max(1) as u32,
            Dimension::cm(6.0).to_pixels(dpi).max(1) as u32,
        )
    }

    pub fn default_layout(self) -> LayoutKind {
        match self {
            PhotoKind::Biometric => LayoutKind::FourUpBiometric,
            PhotoKind::Passport => LayoutKind::FourUpPassport,
            PhotoKind::Postcard => LayoutKind::SinglePostcard,
        }
    }
}

impl fmt::Display for PhotoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PhotoKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        PhotoKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| CoreError::UnknownPhotoKind(s.to_string()))
    }
}

/// Where the head top used for scaling came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadTopSource {
    Provided,
    Detected,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum Normalization {
    HeadMetric {
        head_top: AnchorPoint,
        head_top_source: HeadTopSource,
        placement: HeadPlacement,
    },
    BoundedCrop {
        crop: CropOutcome,
        /// True when the head-metric path was attempted and rejected.
        fallback: bool,
    },
}

/// Geometry summary of one run, suitable for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kind: PhotoKind,
    pub layout: LayoutKind,
    pub dpi: u32,
    pub face: BoundingBox,
    pub normalization: Normalization,
    pub photo_width: u32,
    pub photo_height: u32,
    pub page: PagePlan,
    pub matte_applied: bool,
    pub retouched: bool,
}

/// One photo to produce.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub source: &'a RgbImage,
    pub face: BoundingBox,
    /// Foreground matte from an external matting service, at any resolution.
    pub matte: Option<&'a AlphaMatte>,
    /// Overrides the head-top search when the caller already knows it.
    pub head_top: Option<AnchorPoint>,
    pub kind: PhotoKind,
    pub layout: LayoutKind,
}

impl<'a> Job<'a> {
    pub fn new(source: &'a RgbImage, face: BoundingBox, kind: PhotoKind) -> Self {
        Self {
            source,
            face,
            matte: None,
            head_top: None,
            kind,
            layout: kind.default_layout(),
        }
    }
}

pub struct Output {
    /// The normalized single photo.
    pub photo: RgbImage,
    /// The print page.
    pub page: RgbImage,
    pub report: Report,
}

/// Normalizes a photo and lays it out on a print page.
pub struct Pipeline {
    pub dpi: u32,
    pub background: Rgb<u8>,
    pub refine: RefineOptions,
    /// Crop width as a multiple of the face width on the bounded-crop path.
    pub face_scale: f64,
    /// Fraction of the crop height kept above the face box.
    pub top_padding: f64,
    pub retouch: Option<Retouch>,
    pub head_search: Box<dyn HeadTopSearch>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            background: Rgb([255, 255, 255]),
            refine: RefineOptions::default(),
            face_scale: 2.0,
            top_padding: 0.25,
            retouch: None,
            head_search: Box::new(EdgeHeadTopSearch::default()),
        }
    }
}

impl Pipeline {
    pub fn with_head_search(mut self, search: impl HeadTopSearch + 'static) -> Self {
        self.head_search = Box::new(search);
        self
    }

    pub fn process(&self, job: &Job<'_>) -> Result<Output> {
        let subject = match job.matte {
            Some(m) => {
                let refined = matte::refine(m, job.source, &self.refine);
                composite(job.source, &refined, self.background)
            }
            None => job.source.clone(),
        };

        let size = job.kind.photo_size(self.dpi);
        let (photo, normalization) = match job.kind {
            PhotoKind::Biometric => self.biometric(&subject, job, size)?,
            PhotoKind::Passport | PhotoKind::Postcard => {
                let (photo, crop) = self.bounded_crop(&subject, &job.face, size);
                (photo, Normalization::BoundedCrop { crop, fallback: false })
            }
        };

        let spec = job.layout.spec();
        let mut page = layout::compose(&photo, &spec, self.dpi, self.background);
        if let Some(retouch) = &self.retouch {
            page = retouch.apply(&page);
        }
        info!(
            "{} photo {}x{} laid out as {} ({}x{})",
            job.kind,
            photo.width(),
            photo.height(),
            job.layout,
            page.width(),
            page.height()
        );

        let report = Report {
            kind: job.kind,
            layout: job.layout,
            dpi: self.dpi,
            face: job.face,
            normalization,
            photo_width: photo.width(),
            photo_height: photo.height(),
            page: layout::plan(&spec, self.dpi),
            matte_applied: job.matte.is_some(),
            retouched: self.retouch.is_some(),
        };
        Ok(Output { photo, page, report })
    }

    /// Run `detector` on the source and process the largest face.
    ///
    /// Returns `Ok(None)` when no face was found.
    pub fn process_detected(
        &self,
        detector: &dyn FaceDetector,
        source: &RgbImage,
        matte: Option<&AlphaMatte>,
        kind: PhotoKind,
    ) -> Result<Option<Output>> {
        let Some(face) = face::detect_largest(detector, source) else {
            warn!("no face detected in {}x{} source", source.width(), source.height());
            return Ok(None);
        };
        let job = Job {
            matte,
            ..Job::new(source, face, kind)
        };
        self.process(&job).map(Some)
    }

    fn biometric(&self, img: &RgbImage, job: &Job<'_>, size: (u32, u32)) -> Result<(RgbImage, Normalization)> {
        let (head_top, head_top_source) = match job.head_top {
            Some(p) => (p, HeadTopSource::Provided),
            None => match face::head_top_or_estimate(self.head_search.as_ref(), img, &job.face) {
                (p, true) => (p, HeadTopSource::Detected),
                (p, false) => (p, HeadTopSource::Estimated),
            },
        };
        let measurement = HeadMeasurement::from_face(&job.face, head_top);
        let target = HeadTarget::biometric(self.dpi);

        match head::normalize(img, &measurement, &target, self.background) {
            Ok((photo, placement)) => Ok((
                photo,
                Normalization::HeadMetric {
                    head_top,
                    head_top_source,
                    placement,
                },
            )),
            Err(CoreError::DegenerateMeasurement { head_to_chin_px }) => {
                warn!("head measurement unusable ({head_to_chin_px:.2}px), falling back to face crop");
                let (photo, crop) = self.bounded_crop(img, &job.face, size);
                Ok((photo, Normalization::BoundedCrop { crop, fallback: true }))
            }
            Err(e) => Err(e),
        }
    }

    fn bounded_crop(&self, img: &RgbImage, face: &BoundingBox, (width, height): (u32, u32)) -> (RgbImage, CropOutcome) {
        let desired_width = face.width * self.face_scale;
        let request = CropRequest {
            desired_width,
            desired_height: desired_width * height as f64 / width as f64,
            anchor_x: face.center_x(),
            anchor_top_y: face.y,
            top_padding: self.top_padding,
        };
        let outcome = crop::solve(img.width(), img.height(), &request);
        let r = outcome.rect;
        let patch = imageops::crop_imm(img, r.x1, r.y1, r.width(), r.height()).to_image();
        (imageops::resize(&patch, width, height, FilterType::Lanczos3), outcome)
    }
}
