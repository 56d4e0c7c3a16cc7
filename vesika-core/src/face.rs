use image::{GrayImage, RgbImage};
use imageproc::{edges::canny, filter::gaussian_blur_f32};
use log::debug;

use crate::geometry::{AnchorPoint, BoundingBox};

/// Pluggable face detection backend.
///
/// The core never runs a detection model itself; implement this over whatever
/// engine the application ships and hand the result to the pipeline.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<BoundingBox>;
}

/// Locates the top of the head (hair line) above a detected face.
pub trait HeadTopSearch: Send + Sync {
    /// `None` means no usable edge was found; callers then use [`estimate_head_top`].
    fn find(&self, img: &RgbImage, face: &BoundingBox) -> Option<AnchorPoint>;
}

/// Pick the largest box by area. Ranking by confidence is deliberately ignored.
pub fn largest_face(faces: &[BoundingBox]) -> Option<BoundingBox> {
    faces
        .iter()
        .filter(|f| f.is_valid())
        .copied()
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

/// Run `detector` on the grayscale version of `img` and keep the largest face.
pub fn detect_largest(detector: &dyn FaceDetector, img: &RgbImage) -> Option<BoundingBox> {
    let gray = image::imageops::grayscale(img);
    let faces = detector.detect(gray.as_raw(), gray.width(), gray.height());
    debug!("detector returned {} face(s)", faces.len());
    largest_face(&faces)
}

/// Fallback head top: 40% of the face height above the box, clamped to the image.
pub fn estimate_head_top(face: &BoundingBox) -> AnchorPoint {
    AnchorPoint::new(face.center_x(), (face.y - 0.4 * face.height).max(0.0))
}

/// Head-top search over Canny edges in a window above the face.
#[derive(Debug, Clone)]
pub struct EdgeHeadTopSearch {
    pub blur_sigma: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Search window width relative to the face width.
    pub width_factor: f64,
    /// How far above the face top to look, relative to the face height.
    pub above_factor: f64,
    /// How far into the face (forehead) to look, relative to the face height.
    pub below_factor: f64,
    /// Max horizontal distance of a candidate from the face center, relative to face width.
    pub center_tolerance: f64,
    /// Candidates within this many rows of the topmost one are averaged for x.
    pub top_band_px: u32,
}

impl Default for EdgeHeadTopSearch {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            low_threshold: 50.0,
            high_threshold: 150.0,
            width_factor: 1.2,
            above_factor: 0.8,
            below_factor: 0.3,
            center_tolerance: 0.6,
            top_band_px: 10,
        }
    }
}

impl EdgeHeadTopSearch {
    fn edges(&self, img: &RgbImage) -> GrayImage {
        let gray = image::imageops::grayscale(img);
        let blurred = gaussian_blur_f32(&gray, self.blur_sigma);
        canny(&blurred, self.low_threshold, self.high_threshold)
    }
}

impl HeadTopSearch for EdgeHeadTopSearch {
    fn find(&self, img: &RgbImage, face: &BoundingBox) -> Option<AnchorPoint> {
        if !face.is_valid() || img.width() == 0 || img.height() == 0 {
            return None;
        }
        let edges = self.edges(img);
        let (w, h) = (img.width() as f64, img.height() as f64);

        let center_x = face.center_x();
        let half_width = face.width * self.width_factor / 2.0;
        let x1 = (center_x - half_width).max(0.0).floor() as u32;
        let x2 = (center_x + half_width).min(w).floor() as u32;
        let y1 = (face.y - face.height * self.above_factor).max(0.0).floor() as u32;
        let y2 = (face.y + face.height * self.below_factor).min(h).floor() as u32;
        debug!("head search window: x=({x1}, {x2}), y=({y1}, {y2})");

        let tolerance = face.width * self.center_tolerance;
        let mut top: Option<u32> = None;
        let mut sum_x = 0.0;
        let mut count = 0u32;

        for y in y1..y2 {
            if let Some(top_y) = top {
                if y > top_y + self.top_band_px {
                    break;
                }
            }
            for x in x1..x2 {
                if edges.get_pixel(x, y)[0] == 0 || (x as f64 - center_x).abs() >= tolerance {
                    continue;
                }
                top.get_or_insert(y);
                sum_x += x as f64;
                count += 1;
            }
        }

        let top_y = top?;
        let point = AnchorPoint::new(sum_x / count as f64, top_y as f64);
        debug!("detected head top at ({:.1}, {:.1})", point.x, point.y);
        Some(point)
    }
}

/// Search for the head top, falling back to the face-based estimate.
///
/// The boolean is `true` when the point came from the search.
pub fn head_top_or_estimate(
    search: &dyn HeadTopSearch,
    img: &RgbImage,
    face: &BoundingBox,
) -> (AnchorPoint, bool) {
    match search.find(img, face) {
        Some(point) => (point, true),
        None => {
            debug!("no head edges detected, using face-based estimate");
            (estimate_head_top(face), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<BoundingBox> {
            self.0.clone()
        }
    }

    #[test]
    fn largest_face_by_area() {
        let faces = vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(50.0, 50.0, 30.0, 40.0),
            BoundingBox::new(5.0, 5.0, 20.0, 20.0),
        ];
        let best = largest_face(&faces).unwrap();
        assert_eq!(best, faces[1]);
        assert!(largest_face(&[]).is_none());
    }

    #[test]
    fn infinite_box_never_wins() {
        let faces = vec![
            BoundingBox::new(0.0, 0.0, f64::INFINITY, 10.0),
            BoundingBox::new(5.0, 5.0, 20.0, 20.0),
        ];
        assert_eq!(largest_face(&faces), Some(faces[1]));
    }

    #[test]
    fn detect_largest_uses_detector_output() {
        let img = RgbImage::new(64, 64);
        let detector = FixedDetector(vec![
            BoundingBox::new(1.0, 1.0, 5.0, 5.0),
            BoundingBox::new(10.0, 10.0, 20.0, 20.0),
        ]);
        let face = detect_largest(&detector, &img).unwrap();
        assert_eq!(face.width, 20.0);
    }

    #[test]
    fn estimate_is_clamped_to_top() {
        let face = BoundingBox::new(100.0, 20.0, 100.0, 100.0);
        let top = estimate_head_top(&face);
        assert_eq!(top, AnchorPoint::new(150.0, 0.0));

        let face = BoundingBox::new(100.0, 200.0, 100.0, 100.0);
        assert_eq!(estimate_head_top(&face).y, 160.0);
    }

    #[test]
    fn flat_image_has_no_head_edge() {
        let img = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let face = BoundingBox::new(60.0, 80.0, 80.0, 80.0);
        let search = EdgeHeadTopSearch::default();
        assert!(search.find(&img, &face).is_none());

        let (point, found) = head_top_or_estimate(&search, &img, &face);
        assert!(!found);
        assert_eq!(point, estimate_head_top(&face));
    }

    #[test]
    fn finds_top_of_dark_head_on_white() {
        // Dark head block from row 40 down, on a white background.
        let mut img = RgbImage::from_pixel(200, 240, Rgb([255, 255, 255]));
        for y in 40..240 {
            for x in 60..140 {
                img.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        let face = BoundingBox::new(70.0, 90.0, 60.0, 70.0);
        let point = EdgeHeadTopSearch::default().find(&img, &face).unwrap();
        assert!((point.y - 40.0).abs() <= 3.0, "head top y = {}", point.y);
        assert!((point.x - 100.0).abs() <= 20.0, "head top x = {}", point.x);
    }
}
