//! Print page layout.
//!
//! Places 1, 2, or 4 identical copies of a photo on a fixed-size page. Each
//! axis is resolved independently: leading margin, items, gaps, and a trailing
//! margin that absorbs whatever rounding left over, so every axis sums to the
//! page size exactly and every copy has the same pixel size.

use std::{fmt, str::FromStr};

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
    rect::Rect,
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::units::Dimension;

const CUT_FRAME_COLOR: [u8; 3] = [160, 160, 160];
const CUT_FRAME_WIDTH: u32 = 6;
const CENTERLINE_COLOR: [u8; 3] = [0, 0, 0];
const CENTERLINE_WIDTH: u32 = 2;

/// How the leading margin of an axis is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Lead {
    /// Fixed physical margin.
    Fixed(Dimension),
    /// Half of the slack left after items and gaps, rounded down.
    CenterSlack,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisSpec {
    pub page: Dimension,
    pub item: Dimension,
    pub count: u32,
    pub lead: Lead,
    pub gap: Dimension,
    /// Nominal trailing margin; the resolved one also absorbs the rounding residual.
    pub trail: Dimension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fit {
    /// Resize straight to the item size.
    Stretch,
    /// Preserve aspect: resize to cover the item, then trim the overflow evenly.
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CutGuides {
    pub frame_width: u32,
    pub frame_color: [u8; 3],
    /// Optional full-width horizontal line through the page middle.
    pub centerline: Option<(u32, [u8; 3])>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutSpec {
    pub name: &'static str,
    pub horizontal: AxisSpec,
    pub vertical: AxisSpec,
    pub fit: Fit,
    pub guides: Option<CutGuides>,
}

impl LayoutSpec {
    pub fn copies(&self) -> u32 {
        self.horizontal.count * self.vertical.count
    }
}

/// The static layout table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutKind {
    FourUpBiometric,
    FourUpPassport,
    TwoUpBiometric,
    TwoUpPassport,
    SinglePostcard,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 5] = [
        LayoutKind::FourUpBiometric,
        LayoutKind::FourUpPassport,
        LayoutKind::TwoUpBiometric,
        LayoutKind::TwoUpPassport,
        LayoutKind::SinglePostcard,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayoutKind::FourUpBiometric => "four-up-biometric",
            LayoutKind::FourUpPassport => "four-up-passport",
            LayoutKind::TwoUpBiometric => "two-up-biometric",
            LayoutKind::TwoUpPassport => "two-up-passport",
            LayoutKind::SinglePostcard => "single-postcard",
        }
    }

    pub fn spec(self) -> LayoutSpec {
        let frames = CutGuides {
            frame_width: CUT_FRAME_WIDTH,
            frame_color: CUT_FRAME_COLOR,
            centerline: None,
        };
        let tall_rows = |item_cm: f64| AxisSpec {
            page: Dimension::cm(15.0),
            item: Dimension::cm(item_cm),
            count: 2,
            lead: Lead::Fixed(Dimension::cm(0.75)),
            gap: Dimension::cm(1.5),
            trail: Dimension::cm(0.75),
        };
        match self {
            LayoutKind::FourUpBiometric => LayoutSpec {
                name: self.name(),
                horizontal: AxisSpec {
                    page: Dimension::cm(10.0),
                    item: Dimension::cm(5.0),
                    count: 2,
                    lead: Lead::Fixed(Dimension::cm(0.0)),
                    gap: Dimension::cm(0.0),
                    trail: Dimension::cm(0.0),
                },
                vertical: tall_rows(6.0),
                fit: Fit::Stretch,
                guides: Some(CutGuides {
                    centerline: Some((CENTERLINE_WIDTH, CENTERLINE_COLOR)),
                    ..frames
                }),
            },
            LayoutKind::FourUpPassport => LayoutSpec {
                name: self.name(),
                horizontal: AxisSpec {
                    page: Dimension::cm(10.0),
                    item: Dimension::cm(4.5),
                    count: 2,
                    lead: Lead::Fixed(Dimension::cm(0.25)),
                    gap: Dimension::cm(0.5),
                    trail: Dimension::cm(0.25),
                },
                vertical: tall_rows(6.0),
                fit: Fit::Stretch,
                guides: Some(frames),
            },
            LayoutKind::TwoUpBiometric => LayoutSpec {
                name: self.name(),
                horizontal: AxisSpec {
                    page: Dimension::cm(5.0),
                    item: Dimension::cm(5.0),
                    count: 1,
                    lead: Lead::Fixed(Dimension::cm(0.0)),
                    gap: Dimension::cm(0.0),
                    trail: Dimension::cm(0.0),
                },
                vertical: AxisSpec {
                    page: Dimension::cm(15.0),
                    item: Dimension::cm(6.0),
                    count: 2,
                    lead: Lead::CenterSlack,
                    gap: Dimension::cm(1.0),
                    trail: Dimension::cm(0.0),
                },
                fit: Fit::Stretch,
                guides: Some(frames),
            },
            LayoutKind::TwoUpPassport => LayoutSpec {
                name: self.name(),
                horizontal: AxisSpec {
                    page: Dimension::cm(5.0),
                    item: Dimension::cm(4.5),
                    count: 1,
                    lead: Lead::Fixed(Dimension::cm(0.25)),
                    gap: Dimension::cm(0.0),
                    trail: Dimension::cm(0.25),
                },
                vertical: AxisSpec {
                    page: Dimension::cm(15.0),
                    item: Dimension::cm(6.0),
                    count: 2,
                    lead: Lead::CenterSlack,
                    gap: Dimension::cm(1.5),
                    trail: Dimension::cm(0.0),
                },
                fit: Fit::Stretch,
                guides: Some(frames),
            },
            LayoutKind::SinglePostcard => LayoutSpec {
                name: self.name(),
                horizontal: AxisSpec {
                    page: Dimension::cm(10.0),
                    item: Dimension::cm(10.0),
                    count: 1,
                    lead: Lead::Fixed(Dimension::cm(0.0)),
                    gap: Dimension::cm(0.0),
                    trail: Dimension::cm(0.0),
                },
                vertical: AxisSpec {
                    page: Dimension::cm(15.0),
                    item: Dimension::cm(14.0),
                    count: 1,
                    lead: Lead::Fixed(Dimension::cm(1.0)),
                    gap: Dimension::cm(0.0),
                    trail: Dimension::cm(0.0),
                },
                fit: Fit::Cover,
                guides: None,
            },
        }
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayoutKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayoutKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| CoreError::UnknownLayout(s.to_string()))
    }
}

/// One axis resolved to pixels. `lead + count * item + (count - 1) * gap + trail == page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxisPlan {
    pub page: i64,
    pub lead: i64,
    pub item: i64,
    pub gap: i64,
    pub count: u32,
    /// May be negative: the last item then overhangs the page and is clipped.
    pub trail: i64,
    /// How far the trailing margin moved from its nominal size.
    pub residual: i64,
}

impl AxisPlan {
    pub fn resolve(axis: &AxisSpec, dpi: u32) -> Self {
        let page = axis.page.to_pixels(dpi);
        let item = axis.item.to_pixels(dpi);
        let gap = axis.gap.to_pixels(dpi);
        let count = axis.count.max(1);
        let content = count as i64 * item + (count as i64 - 1) * gap;
        let lead = match axis.lead {
            Lead::Fixed(margin) => margin.to_pixels(dpi),
            Lead::CenterSlack => (page - content).div_euclid(2),
        };
        let trail = page - lead - content;
        let nominal = match axis.lead {
            Lead::Fixed(_) => axis.trail.to_pixels(dpi),
            Lead::CenterSlack => trail,
        };
        Self {
            page,
            lead,
            item,
            gap,
            count,
            trail,
            residual: trail - nominal,
        }
    }

    pub fn positions(&self) -> Vec<i64> {
        (0..self.count as i64)
            .map(|i| self.lead + i * (self.item + self.gap))
            .collect()
    }

    pub fn total(&self) -> i64 {
        self.lead + self.count as i64 * self.item + (self.count as i64 - 1) * self.gap + self.trail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePlan {
    pub width: u32,
    pub height: u32,
    pub item_width: u32,
    pub item_height: u32,
    pub columns: AxisPlan,
    pub rows: AxisPlan,
    /// Top-left corner of each copy, row-major.
    pub slots: Vec<(i64, i64)>,
}

pub fn plan(spec: &LayoutSpec, dpi: u32) -> PagePlan {
    let columns = AxisPlan::resolve(&spec.horizontal, dpi);
    let rows = AxisPlan::resolve(&spec.vertical, dpi);
    let slots = rows
        .positions()
        .into_iter()
        .flat_map(|y| columns.positions().into_iter().map(move |x| (x, y)))
        .collect();
    debug!(
        "layout {}: page {}x{}, columns {:?}, rows {:?}",
        spec.name, columns.page, rows.page, columns, rows
    );
    PagePlan {
        width: columns.page.max(1) as u32,
        height: rows.page.max(1) as u32,
        item_width: columns.item.max(1) as u32,
        item_height: rows.item.max(1) as u32,
        columns,
        rows,
        slots,
    }
}

fn fit_item(photo: &RgbImage, width: u32, height: u32, fit: Fit) -> RgbImage {
    match fit {
        Fit::Stretch => imageops::resize(photo, width, height, FilterType::Lanczos3),
        Fit::Cover => {
            let (pw, ph) = (photo.width().max(1) as f64, photo.height().max(1) as f64);
            let s = (width as f64 / pw).max(height as f64 / ph);
            let cw = ((pw * s).round() as u32).max(width);
            let ch = ((ph * s).round() as u32).max(height);
            let covered = imageops::resize(photo, cw, ch, FilterType::Lanczos3);
            imageops::crop_imm(&covered, (cw - width) / 2, (ch - height) / 2, width, height).to_image()
        }
    }
}

fn draw_guides(page: &mut RgbImage, plan: &PagePlan, guides: &CutGuides) {
    let color = Rgb(guides.frame_color);
    for &(x, y) in &plan.slots {
        for t in 0..guides.frame_width {
            let (w, h) = (plan.item_width, plan.item_height);
            if w <= 2 * t || h <= 2 * t {
                break;
            }
            let rect = Rect::at(x as i32 + t as i32, y as i32 + t as i32).of_size(w - 2 * t, h - 2 * t);
            draw_hollow_rect_mut(page, rect, color);
        }
    }
    if let Some((width, color)) = guides.centerline {
        if width > 0 {
            let top = (plan.height / 2) as i32 - (width / 2) as i32;
            draw_filled_rect_mut(page, Rect::at(0, top).of_size(plan.width, width), Rgb(color));
        }
    }
}

/// Render `photo` into every slot of `spec` on a fresh page.
pub fn compose(photo: &RgbImage, spec: &LayoutSpec, dpi: u32, background: Rgb<u8>) -> RgbImage {
    let plan = plan(spec, dpi);
    let mut page = RgbImage::from_pixel(plan.width, plan.height, background);
    for &(x, y) in &plan.slots {
        // Each copy is resampled from the source, never from another copy.
        let item = fit_item(photo, plan.item_width, plan.item_height, spec.fit);
        imageops::replace(&mut page, &item, x, y);
    }
    if let Some(guides) = &spec.guides {
        draw_guides(&mut page, &plan, guides);
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_layout_reconciles_exactly() {
        for dpi in [72, 150, 300, 600] {
            for kind in LayoutKind::ALL {
                let p = plan(&kind.spec(), dpi);
                assert_eq!(p.columns.total(), p.width as i64, "{kind} columns @ {dpi}");
                assert_eq!(p.rows.total(), p.height as i64, "{kind} rows @ {dpi}");
                assert_eq!(p.slots.len() as u32, kind.spec().copies());
            }
        }
    }

    #[test]
    fn four_up_biometric_at_300_dpi() {
        let p = plan(&LayoutKind::FourUpBiometric.spec(), 300);
        assert_eq!((p.width, p.height), (1181, 1772));
        assert_eq!((p.item_width, p.item_height), (591, 709));
        assert_eq!(p.rows.lead, 89);
        assert_eq!(p.rows.gap, 177);
        assert_eq!(p.rows.trail, 88);
        assert_eq!(p.rows.residual, -1);
        assert_eq!(p.columns.trail, -1);
        assert_eq!(p.slots, vec![(0, 89), (591, 89), (0, 975), (591, 975)]);
    }

    #[test]
    fn four_up_passport_is_centered() {
        let p = plan(&LayoutKind::FourUpPassport.spec(), 300);
        assert_eq!((p.item_width, p.item_height), (531, 709));
        assert_eq!(p.columns.lead, 30);
        assert_eq!(p.columns.gap, 59);
        assert_eq!(p.columns.trail, 30);
    }

    #[test]
    fn two_up_splits_slack() {
        let p = plan(&LayoutKind::TwoUpPassport.spec(), 300);
        assert_eq!((p.width, p.height), (591, 1772));
        assert_eq!(p.rows.lead, 88);
        assert_eq!(p.rows.trail, 89);
        let p = plan(&LayoutKind::TwoUpBiometric.spec(), 300);
        assert_eq!(p.rows.lead, 118);
        assert_eq!(p.rows.trail, 118);
    }

    #[test]
    fn postcard_fills_below_top_margin() {
        let p = plan(&LayoutKind::SinglePostcard.spec(), 300);
        assert_eq!((p.item_width, p.item_height), (1181, 1654));
        assert_eq!(p.slots, vec![(0, 118)]);
        assert_eq!(p.rows.trail, 0);
    }

    #[test]
    fn names_round_trip() {
        for kind in LayoutKind::ALL {
            assert_eq!(kind.name().parse::<LayoutKind>().unwrap(), kind);
        }
        assert!("six-up".parse::<LayoutKind>().is_err());
    }

    #[test]
    fn cover_fit_trims_to_exact_size() {
        let photo = RgbImage::from_pixel(300, 400, Rgb([50, 60, 70]));
        let item = fit_item(&photo, 200, 100, Fit::Cover);
        assert_eq!(item.dimensions(), (200, 100));
    }
}
