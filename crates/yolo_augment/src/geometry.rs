//! Box coordinate transforms matching the pixel operations in [`crate::image_ops`].
//!
//! Everything here is pure: no pixels, no randomness. Shapes are `(height, width)`.

use crate::types::{BoundingBox, FlipCode};

/// Rotation center used by both the box and the pixel rotation.
pub fn rotation_center(height: u32, width: u32) -> (f64, f64) {
    ((f64::from(width) - 0.5) / 2.0, (f64::from(height) - 0.5) / 2.0)
}

/// `(sin, cos)` of an angle in degrees; quarter turns are exact so rounding at `.5` is stable.
pub(crate) fn sin_cos_degrees(angle_degrees: f64) -> (f64, f64) {
    let a = angle_degrees.rem_euclid(360.0);
    if a == 0.0 {
        (0.0, 1.0)
    } else if a == 90.0 {
        (1.0, 0.0)
    } else if a == 180.0 {
        (0.0, -1.0)
    } else if a == 270.0 {
        (-1.0, 0.0)
    } else {
        a.to_radians().sin_cos()
    }
}

/// Rotates boxes counter-clockwise (as displayed) by `angle_degrees` about the image center.
///
/// The origin is top-left with rows growing downward, so the standard rotation is applied
/// to `(x, -y)` and the resulting y is negated back. All four corners are rotated and the
/// new box is their envelope, rounded and clamped to `[0,w]×[0,h]`. Boxes left without
/// area are dropped.
pub fn rotate_box(
    height: u32,
    width: u32,
    boxes: &[BoundingBox],
    angle_degrees: f64,
) -> Vec<BoundingBox> {
    let (w0, h0) = rotation_center(height, width);
    let (sin, cos) = sin_cos_degrees(angle_degrees);
    let rotate = |x: f64, y: f64| -> (f64, f64) {
        let dx = x - w0;
        let dy = -y + h0;
        (dx * cos - dy * sin + w0, -(dx * sin + dy * cos - h0))
    };

    boxes
        .iter()
        .filter_map(|b| {
            let (x1, y1, x2, y2) = (
                f64::from(b.x1),
                f64::from(b.y1),
                f64::from(b.x2),
                f64::from(b.y2),
            );
            let corners = [
                rotate(x1, y1),
                rotate(x2, y2),
                rotate(x2, y1),
                rotate(x1, y2),
            ];
            let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
            let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            for (x, y) in corners {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
            b.with_coords(
                min_x.round() as i32,
                min_y.round() as i32,
                max_x.round() as i32,
                max_y.round() as i32,
            )
            .clipped(width, height)
        })
        .collect()
}

/// Mirrors boxes inside a `width`×`height` frame. Never drops a box.
pub fn flip_box(height: u32, width: u32, boxes: &[BoundingBox], flip: FlipCode) -> Vec<BoundingBox> {
    let mirror = |side: u32, c: i32| saturate(i64::from(side) - i64::from(c));
    boxes
        .iter()
        .map(|b| {
            let (x1, x2) = if flip.mirrors_x() {
                (mirror(width, b.x2), mirror(width, b.x1))
            } else {
                (b.x1, b.x2)
            };
            let (y1, y2) = if flip.mirrors_y() {
                (mirror(height, b.y2), mirror(height, b.y1))
            } else {
                (b.y1, b.y2)
            };
            b.with_coords(x1, y1, x2, y2)
        })
        .collect()
}

fn saturate(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// How a resized frame sits on the canvas along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterboxCase {
    /// Frame fits on both axes: padded all around.
    PadBoth,
    /// Frame taller than the canvas: rows center-cropped, columns padded.
    CropRows,
    /// Frame wider than the canvas: columns center-cropped, rows padded.
    CropCols,
    /// Frame exceeds the canvas on both axes: center-cropped.
    CropBoth,
}

/// Placement of a `new_w`×`new_h` frame centered on a `bg_w`×`bg_h` canvas.
///
/// `dx`/`dy` are the canvas coordinates of the frame's top-left corner; they are negative
/// on a cropped axis. The pixel paste and the box offsets both read these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterboxLayout {
    pub case: LetterboxCase,
    pub new_h: u32,
    pub new_w: u32,
    pub bg_h: u32,
    pub bg_w: u32,
    pub dx: i64,
    pub dy: i64,
}

fn centered_offset(inner: u32, outer: u32) -> i64 {
    let (inner, outer) = (i64::from(inner), i64::from(outer));
    if outer >= inner {
        (outer - inner) / 2
    } else {
        -((inner - outer) / 2)
    }
}

impl LetterboxLayout {
    pub fn new(new_h: u32, new_w: u32, bg_h: u32, bg_w: u32) -> Self {
        let case = match (new_h <= bg_h, new_w <= bg_w) {
            (true, true) => LetterboxCase::PadBoth,
            (false, true) => LetterboxCase::CropRows,
            (true, false) => LetterboxCase::CropCols,
            (false, false) => LetterboxCase::CropBoth,
        };
        Self {
            case,
            new_h,
            new_w,
            bg_h,
            bg_w,
            dx: centered_offset(new_w, bg_w),
            dy: centered_offset(new_h, bg_h),
        }
    }
}

/// Maps boxes from an `orig_w`×`orig_h` image onto a canvas holding it resized to
/// `new_w`×`new_h` and centered (see [`LetterboxLayout`]).
///
/// Boxes are expressed relative to the original frame, rescaled, then shifted by the
/// layout offset. On padded axes the box is clipped to the pasted frame; on cropped axes
/// only the final canvas clamp to `[0,bg_w-1]×[0,bg_h-1]` applies. Boxes that end up
/// outside the canvas or without area are dropped.
pub fn resize_letterbox_box(
    boxes: &[BoundingBox],
    orig_h: u32,
    orig_w: u32,
    new_h: u32,
    new_w: u32,
    bg_h: u32,
    bg_w: u32,
) -> Vec<BoundingBox> {
    let layout = LetterboxLayout::new(new_h, new_w, bg_h, bg_w);
    letterbox_boxes(boxes, orig_h, orig_w, &layout)
}

pub(crate) fn letterbox_boxes(
    boxes: &[BoundingBox],
    orig_h: u32,
    orig_w: u32,
    layout: &LetterboxLayout,
) -> Vec<BoundingBox> {
    if orig_h == 0 || orig_w == 0 {
        return Vec::new();
    }
    let (ow, oh) = (f64::from(orig_w), f64::from(orig_h));
    let (nw, nh) = (f64::from(layout.new_w), f64::from(layout.new_h));
    let (dx, dy) = (layout.dx as f64, layout.dy as f64);
    let (bg_w, bg_h) = (f64::from(layout.bg_w), f64::from(layout.bg_h));

    boxes
        .iter()
        .filter_map(|b| {
            let (bx1, by1) = (f64::from(b.x1), f64::from(b.y1));
            let (bx2, by2) = (f64::from(b.x2), f64::from(b.y2));
            let rel_cx = (bx1 + bx2) / ow / 2.0;
            let rel_cy = (by1 + by2) / oh / 2.0;
            let rel_w = (bx1 - bx2).abs() / ow;
            let rel_h = (by1 - by2).abs() / oh;

            let (cx, cy) = (nw * rel_cx, nh * rel_cy);
            let (bw, bh) = (nw * rel_w, nh * rel_h);

            let mut x1 = cx - bw / 2.0 + dx;
            let mut x2 = cx + bw / 2.0 + dx;
            let mut y1 = cy - bh / 2.0 + dy;
            let mut y2 = cy + bh / 2.0 + dy;

            let clip_cols = |x1: &mut f64, x2: &mut f64| {
                *x1 = x1.max(dx);
                *x2 = x2.min(dx + nw);
            };
            let clip_rows = |y1: &mut f64, y2: &mut f64| {
                *y1 = y1.max(dy);
                *y2 = y2.min(dy + nh);
            };
            match layout.case {
                LetterboxCase::PadBoth => {
                    clip_cols(&mut x1, &mut x2);
                    clip_rows(&mut y1, &mut y2);
                }
                LetterboxCase::CropRows => clip_cols(&mut x1, &mut x2),
                LetterboxCase::CropCols => clip_rows(&mut y1, &mut y2),
                LetterboxCase::CropBoth => {}
            }

            let x1 = x1.max(0.0);
            let y1 = y1.max(0.0);
            let x2 = x2.min(bg_w - 1.0);
            let y2 = y2.min(bg_h - 1.0);
            if x1 >= bg_w || y1 >= bg_h {
                return None;
            }
            let out = b.with_coords(x1 as i32, y1 as i32, x2.floor() as i32, y2.floor() as i32);
            (out.area() > 0).then_some(out)
        })
        .collect()
}

/// Scales box coordinates per axis, truncating toward zero. Never drops a box.
pub fn scale_boxes(boxes: &[BoundingBox], scale_x: f64, scale_y: f64) -> Vec<BoundingBox> {
    boxes
        .iter()
        .map(|b| {
            b.with_coords(
                (f64::from(b.x1) * scale_x) as i32,
                (f64::from(b.y1) * scale_y) as i32,
                (f64::from(b.x2) * scale_x) as i32,
                (f64::from(b.y2) * scale_y) as i32,
            )
        })
        .collect()
}

/// Places boxes of a `src_shape` image into a `dst_shape` mosaic tile whose top-left
/// corner sits at `quadrant_offset` `(x0, y0)` on the canvas.
///
/// Boxes are clamped to the tile but never dropped, so the count is preserved.
pub fn tile_box(
    boxes: &[BoundingBox],
    src_shape: (u32, u32),
    dst_shape: (u32, u32),
    quadrant_offset: (u32, u32),
) -> Vec<BoundingBox> {
    let (src_h, src_w) = src_shape;
    let (dst_h, dst_w) = dst_shape;
    if src_h == 0 || src_w == 0 {
        return Vec::new();
    }
    let sx = f64::from(dst_w) / f64::from(src_w);
    let sy = f64::from(dst_h) / f64::from(src_h);
    let (x0, y0) = (i64::from(quadrant_offset.0), i64::from(quadrant_offset.1));
    let shift = |c: i32, offset: i64| saturate(i64::from(c) + offset);
    scale_boxes(boxes, sx, sy)
        .into_iter()
        .map(|b| {
            let b = b.clamped(dst_w, dst_h);
            b.with_coords(shift(b.x1, x0), shift(b.y1, y0), shift(b.x2, x0), shift(b.y2, y0))
        })
        .collect()
}
