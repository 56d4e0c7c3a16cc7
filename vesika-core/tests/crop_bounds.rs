use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use vesika_core::crop::{solve, CropRequest, CropResolution};

fn request(w: f64, h: f64, anchor_x: f64, anchor_top_y: f64, padding: f64) -> CropRequest {
    CropRequest {
        desired_width: w,
        desired_height: h,
        anchor_x,
        anchor_top_y,
        top_padding: padding,
    }
}

#[test]
fn oversized_request_becomes_full_image() -> Result<()> {
    let out = solve(400, 300, &request(800.0, 600.0, 200.0, 150.0, 0.25));
    println!("{:?}", out);
    assert_eq!((out.rect.x1, out.rect.y1, out.rect.x2, out.rect.y2), (0, 0, 400, 300));
    assert!((out.scale - 0.5).abs() < 1e-9);
    Ok(())
}

#[test]
fn anchor_near_left_edge_is_translated() -> Result<()> {
    let out = solve(1000, 1000, &request(300.0, 400.0, 50.0, 300.0, 0.25));
    println!("{:?}", out);
    assert_eq!(out.resolution, CropResolution::Translated);
    assert_eq!((out.rect.x1, out.rect.x2), (0, 300));
    assert_eq!(out.rect.width(), 300);
    assert_eq!(out.rect.height(), 400);
    Ok(())
}

#[test]
fn random_requests_stay_inside_image() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for i in 0..5000 {
        let img_w = rng.gen_range(2..1500u32);
        let img_h = rng.gen_range(2..1500u32);
        let req = request(
            rng.gen_range(-100.0..4000.0),
            rng.gen_range(-100.0..4000.0),
            rng.gen_range(-2000.0..4000.0),
            rng.gen_range(-2000.0..4000.0),
            rng.gen_range(-1.0..2.0),
        );
        let out = solve(img_w, img_h, &req);
        let r = out.rect;
        assert!(
            r.x1 < r.x2 && r.x2 <= img_w && r.y1 < r.y2 && r.y2 <= img_h,
            "case {i}: {img_w}x{img_h} {req:?} -> {r:?}"
        );
    }
    Ok(())
}

#[test]
fn translation_keeps_requested_aspect() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut checked = 0;
    for _ in 0..2000 {
        let img_w = rng.gen_range(200..1200u32);
        let img_h = rng.gen_range(200..1200u32);
        let w = rng.gen_range(20.0..img_w as f64);
        let h = rng.gen_range(20.0..img_h as f64);
        let req = request(
            w,
            h,
            rng.gen_range(-300.0..img_w as f64 + 300.0),
            rng.gen_range(-300.0..img_h as f64 + 300.0),
            0.25,
        );
        let out = solve(img_w, img_h, &req);
        if out.resolution != CropResolution::Translated {
            continue;
        }
        checked += 1;
        assert!((out.rect.width() as f64 - w).abs() <= 1.0, "{req:?} -> {:?}", out.rect);
        assert!((out.rect.height() as f64 - h).abs() <= 1.0, "{req:?} -> {:?}", out.rect);
    }
    println!("checked {checked} translated crops");
    assert!(checked > 0);
    Ok(())
}
