//! Pixel-level transforms. Box bookkeeping lives in [`crate::geometry`]; the few operations
//! that combine several samples (mixup, mosaic) call into it so both sides stay in step.

use crate::geometry::{flip_box, rotation_center, scale_boxes, tile_box, LetterboxLayout};
use crate::types::{BoundingBox, Canvas, FlipCode, Sample};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use imageproc::rect::Rect;
use rand::Rng;

/// Outline drawn around pixelated regions.
pub const PIXELATE_OUTLINE: Rgb<u8> = Rgb([0, 250, 0]);
/// Fill used by [`fit_letterbox`].
pub const LETTERBOX_GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// Rotates counter-clockwise about the center shared with [`crate::geometry::rotate_box`].
/// Output keeps the input size; uncovered pixels are black.
pub fn rotate_image(img: &RgbImage, angle_degrees: f64) -> RgbImage {
    if angle_degrees.rem_euclid(360.0) == 0.0 {
        return img.clone();
    }
    let (cx, cy) = rotation_center(img.height(), img.width());
    let (cx, cy) = (cx as f32, cy as f32);
    // Projection::rotate turns clockwise on screen.
    let theta = -(angle_degrees.to_radians() as f32);
    let projection = Projection::translate(cx, cy)
        * Projection::rotate(theta)
        * Projection::translate(-cx, -cy);
    warp(img, &projection, Interpolation::Bicubic, Rgb([0, 0, 0]))
}

pub fn flip_image(img: &mut RgbImage, flip: FlipCode) {
    if flip.mirrors_x() {
        imageops::flip_horizontal_in_place(img);
    }
    if flip.mirrors_y() {
        imageops::flip_vertical_in_place(img);
    }
}

/// Occludes random square-ish patches with a coarse mosaic.
///
/// Each box (or the whole image when `boxes` is empty) receives between `1` and
/// `pixel_num - 1` patches whose sides are `mask_ratio` of the region's sides. A patch is
/// cut into cells of side `max(round(kernel_ratio * min_side), 2)`; every cell is filled
/// with the color of its center pixel, so no read ever leaves the patch. Patches get a
/// green outline. Boxes are not touched.
pub fn pixelate(
    img: &mut RgbImage,
    boxes: &[BoundingBox],
    pixel_num: u32,
    mask_ratio: f64,
    kernel_ratio: f64,
    rng: &mut dyn rand::RngCore,
) {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let regions: Vec<(u32, u32, u32, u32)> = if boxes.is_empty() {
        vec![(0, 0, width, height)]
    } else {
        boxes
            .iter()
            .filter_map(|b| b.clipped(width, height))
            .map(|b| (b.x1 as u32, b.y1 as u32, b.x2 as u32, b.y2 as u32))
            .collect()
    };

    for (rx1, ry1, rx2, ry2) in regions {
        let (rw, rh) = (rx2 - rx1, ry2 - ry1);
        let count = if pixel_num > 1 {
            rng.random_range(1..pixel_num)
        } else {
            1
        };
        for _ in 0..count {
            let pw = ((f64::from(rw) * mask_ratio).floor() as u32).clamp(1, rw);
            let ph = ((f64::from(rh) * mask_ratio).floor() as u32).clamp(1, rh);
            let sx = rx1 + patch_offset(rw, pw, mask_ratio, rng);
            let sy = ry1 + patch_offset(rh, ph, mask_ratio, rng);
            let kernel = ((f64::from(pw.min(ph)) * kernel_ratio).round() as u32).max(2);
            fill_cells(img, (sx, sy, sx + pw, sy + ph), kernel);
            draw_hollow_rect_mut(
                img,
                Rect::at(sx as i32, sy as i32).of_size(pw, ph),
                PIXELATE_OUTLINE,
            );
        }
    }
}

/// Random start inside a region of `side` so that a `patch`-wide window still fits.
fn patch_offset(side: u32, patch: u32, mask_ratio: f64, rng: &mut dyn rand::RngCore) -> u32 {
    let permille_max = ((1000.0 * (1.0 - mask_ratio)) as u32).max(1);
    let ratio = f64::from(rng.random_range(1..=permille_max)) / 1000.0;
    ((f64::from(side) * ratio).floor() as u32).min(side - patch)
}

fn fill_cells(img: &mut RgbImage, (x1, y1, x2, y2): (u32, u32, u32, u32), kernel: u32) {
    for cy in (y1..y2).step_by(kernel as usize) {
        let cell_y2 = (cy + kernel).min(y2);
        for cx in (x1..x2).step_by(kernel as usize) {
            let cell_x2 = (cx + kernel).min(x2);
            let color = *img.get_pixel(cx + (cell_x2 - cx - 1) / 2, cy + (cell_y2 - cy - 1) / 2);
            for y in cy..cell_y2 {
                for x in cx..cell_x2 {
                    img.put_pixel(x, y, color);
                }
            }
        }
    }
}

/// Blends `img2` onto `img1` at 50% after resizing it to `img1`'s size. `boxes2` follow the
/// resize (truncated), are clamped to the frame and appended to `boxes1`; none is dropped.
pub fn mixup_composite(
    img1: &RgbImage,
    img2: &RgbImage,
    boxes1: &[BoundingBox],
    boxes2: &[BoundingBox],
) -> Sample {
    let (w1, h1) = img1.dimensions();
    let (w2, h2) = img2.dimensions();
    let resized;
    let partner = if (w1, h1) == (w2, h2) {
        img2
    } else {
        resized = imageops::resize(img2, w1, h1, FilterType::CatmullRom);
        &resized
    };

    let mut blended = img1.clone();
    for (dst, src) in blended.pixels_mut().zip(partner.pixels()) {
        for c in 0..3 {
            dst[c] = ((u16::from(dst[c]) + u16::from(src[c]) + 1) / 2) as u8;
        }
    }

    let mut boxes = boxes1.to_vec();
    if w2 > 0 && h2 > 0 {
        let scaled = scale_boxes(
            boxes2,
            f64::from(w1) / f64::from(w2),
            f64::from(h1) / f64::from(h2),
        );
        boxes.extend(scaled.iter().map(|b| b.clamped(w1, h1)));
    }
    Sample::new(blended, boxes)
}

/// Rescales each axis independently by a factor drawn from `scale_range` and centers the
/// result on a canvas of random solid color, cropping any axis that overflows.
///
/// Returns the canvas image and the layout that boxes must follow
/// ([`crate::geometry::resize_letterbox_box`]).
pub fn resize_letterbox(
    img: &RgbImage,
    canvas: Canvas,
    scale_range: (f64, f64),
    rng: &mut dyn rand::RngCore,
) -> (RgbImage, LetterboxLayout) {
    let (lo, hi) = scale_range;
    let scale_h = rng.random_range(lo..=hi);
    let scale_w = rng.random_range(lo..=hi);
    let new_h = ((f64::from(img.height()) * scale_h).ceil() as u32).max(1);
    let new_w = ((f64::from(img.width()) * scale_w).ceil() as u32).max(1);
    let fill = Rgb([rng.random::<u8>(), rng.random::<u8>(), rng.random::<u8>()]);

    let layout = LetterboxLayout::new(new_h, new_w, canvas.height, canvas.width);
    (place_on_canvas(img, &layout, fill), layout)
}

/// Aspect-preserving fit onto the canvas with a gray border.
pub fn fit_letterbox(img: &RgbImage, canvas: Canvas) -> (RgbImage, LetterboxLayout) {
    let (w, h) = img.dimensions();
    let scale = (f64::from(canvas.width) / f64::from(w.max(1)))
        .min(f64::from(canvas.height) / f64::from(h.max(1)));
    let new_w = ((f64::from(w) * scale).round() as u32).clamp(1, canvas.width.max(1));
    let new_h = ((f64::from(h) * scale).round() as u32).clamp(1, canvas.height.max(1));
    let layout = LetterboxLayout::new(new_h, new_w, canvas.height, canvas.width);
    (place_on_canvas(img, &layout, LETTERBOX_GRAY), layout)
}

fn place_on_canvas(img: &RgbImage, layout: &LetterboxLayout, fill: Rgb<u8>) -> RgbImage {
    let resized = if img.dimensions() == (layout.new_w, layout.new_h) {
        img.clone()
    } else {
        imageops::resize(img, layout.new_w, layout.new_h, FilterType::CatmullRom)
    };
    let mut out = RgbImage::from_pixel(layout.bg_w, layout.bg_h, fill);
    imageops::replace(&mut out, &resized, layout.dx, layout.dy);
    out
}

/// HSV jitter: hue shifted in `[-hue, hue]` with wrap-around, saturation and value scaled
/// by factors from [`random_gain`].
pub fn color_jitter(
    img: &mut RgbImage,
    hue: f64,
    sat: f64,
    val: f64,
    rng: &mut dyn rand::RngCore,
) {
    let dh = if hue > 0.0 {
        rng.random_range(-hue..=hue) as f32
    } else {
        0.0
    };
    let gain_s = random_gain(sat, rng) as f32;
    let gain_v = random_gain(val, rng) as f32;
    shift_hsv(img, dh, gain_s, gain_v);
}

fn shift_hsv(img: &mut RgbImage, dh: f32, gain_s: f32, gain_v: f32) {
    for p in img.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(*p);
        let h = (h + dh).rem_euclid(1.0);
        let s = (s * gain_s).clamp(0.0, 1.0);
        let v = (v * gain_v).clamp(0.0, 1.0);
        *p = hsv_to_rgb(h, s, v);
    }
}

/// Factor in `[1, k]` or its reciprocal with equal odds.
pub fn random_gain(k: f64, rng: &mut dyn rand::RngCore) -> f64 {
    if k <= 1.0 {
        return 1.0;
    }
    let f = rng.random_range(1.0..=k);
    if rng.random_bool(0.5) {
        f
    } else {
        1.0 / f
    }
}

fn rgb_to_hsv(p: Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = p.0.map(|c| f32::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let h6 = (h * 6.0).rem_euclid(6.0);
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb([r, g, b].map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8))
}

/// Tiles four samples into the quadrants of a canvas split at a random point in
/// `[0.3, 0.7]` of each side. Every sample is flipped at random, resized to its quadrant and
/// pasted; its boxes are mirrored, rescaled, clamped to the quadrant and offset
/// accordingly. No box is dropped.
///
/// Quadrant order: top-left, top-right, bottom-left, bottom-right.
pub fn mosaic_compose(samples: [Sample; 4], canvas: Canvas, rng: &mut dyn rand::RngCore) -> Sample {
    let (cw, ch) = (canvas.width, canvas.height);
    let x0 = split_point(cw, rng);
    let y0 = split_point(ch, rng);
    let quadrants = [
        (0, 0, x0, y0),
        (x0, 0, cw.saturating_sub(x0), y0),
        (0, y0, x0, ch.saturating_sub(y0)),
        (x0, y0, cw.saturating_sub(x0), ch.saturating_sub(y0)),
    ];

    let mut out = RgbImage::new(cw, ch);
    let mut boxes = Vec::new();
    for (sample, (qx, qy, qw, qh)) in samples.into_iter().zip(quadrants) {
        let Sample {
            image: mut img,
            boxes: src_boxes,
        } = sample;
        let (sw, sh) = img.dimensions();
        let flip = FlipCode::ALL[rng.random_range(0..FlipCode::ALL.len())];
        flip_image(&mut img, flip);
        let flipped = flip_box(sh, sw, &src_boxes, flip);
        boxes.extend(tile_box(&flipped, (sh, sw), (qh, qw), (qx, qy)));
        if qw == 0 || qh == 0 {
            continue;
        }
        let tile = imageops::resize(&img, qw, qh, FilterType::CatmullRom);
        imageops::replace(&mut out, &tile, i64::from(qx), i64::from(qy));
    }
    Sample::new(out, boxes)
}

fn split_point(side: u32, rng: &mut dyn rand::RngCore) -> u32 {
    let percent = rng.random_range(30..=70u32);
    let point = (f64::from(side) * f64::from(percent) / 100.0).round() as u32;
    point.clamp(1, side.saturating_sub(1).max(1))
}
