use anyhow::Result;
use image::{Rgb, RgbImage};
use vesika_core::layout::{compose, plan, LayoutKind};
use vesika_core::units::{to_pixels, Unit};

#[test]
fn five_centimeters_at_300_dpi() -> Result<()> {
    assert_eq!(to_pixels(5.0, Unit::Cm, 300), 591);
    Ok(())
}

#[test]
fn axes_sum_to_page_for_every_layout() -> Result<()> {
    for kind in LayoutKind::ALL {
        for dpi in [96, 200, 300, 350, 600] {
            let p = plan(&kind.spec(), dpi);
            println!("{kind} @ {dpi}: columns {:?} rows {:?}", p.columns, p.rows);
            for axis in [&p.columns, &p.rows] {
                let sum = axis.lead
                    + axis.count as i64 * axis.item
                    + (axis.count as i64 - 1) * axis.gap
                    + axis.trail;
                assert_eq!(sum, axis.page);
            }
        }
    }
    Ok(())
}

#[test]
fn four_up_biometric_page() -> Result<()> {
    let photo = RgbImage::from_pixel(591, 709, Rgb([20, 40, 60]));
    let page = compose(
        &photo,
        &LayoutKind::FourUpBiometric.spec(),
        300,
        Rgb([255, 255, 255]),
    );
    assert_eq!(page.dimensions(), (1181, 1772));

    let p = plan(&LayoutKind::FourUpBiometric.spec(), 300);
    assert_eq!((p.item_width, p.item_height), (591, 709));
    for &(x, y) in &p.slots {
        // Inside the cut frame every copy is the photo itself.
        let (cx, cy) = ((x + 295) as u32, (y + 354) as u32);
        assert_eq!(*page.get_pixel(cx, cy), Rgb([20, 40, 60]));
        // Outermost frame ring is gray.
        assert_eq!(*page.get_pixel(x as u32 + 2, cy), Rgb([160, 160, 160]));
    }
    // Top margin stays background, centerline is black.
    assert_eq!(*page.get_pixel(300, 10), Rgb([255, 255, 255]));
    assert_eq!(*page.get_pixel(300, 886), Rgb([0, 0, 0]));
    Ok(())
}

#[test]
fn postcard_keeps_top_margin() -> Result<()> {
    let photo = RgbImage::from_pixel(531, 709, Rgb([90, 90, 90]));
    let page = compose(
        &photo,
        &LayoutKind::SinglePostcard.spec(),
        300,
        Rgb([255, 255, 255]),
    );
    assert_eq!(page.dimensions(), (1181, 1772));
    assert_eq!(*page.get_pixel(590, 50), Rgb([255, 255, 255]));
    assert_eq!(*page.get_pixel(590, 900), Rgb([90, 90, 90]));
    assert_eq!(*page.get_pixel(590, 1771), Rgb([90, 90, 90]));
    Ok(())
}
