//! Full-range BT.601 colour conversion.

use crate::image::{ColorModel, Image};
use rayon::prelude::*;

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert one pixel from Y'CbCr to R'G'B'.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    (
        clamp_u8(y + 1.402 * v),
        clamp_u8(y - 0.344136 * u - 0.714136 * v),
        clamp_u8(y + 1.772 * u),
    )
}

/// Convert one pixel from R'G'B' to Y'CbCr.
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    (
        clamp_u8(0.299 * r + 0.587 * g + 0.114 * b),
        clamp_u8(128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b),
        clamp_u8(128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b),
    )
}

/// Convert `image` to `model` in place.
pub fn convert(image: &mut Image, model: ColorModel) {
    if image.model == model {
        return;
    }
    let f: fn(u8, u8, u8) -> (u8, u8, u8) = match model {
        ColorModel::Rgb => yuv_to_rgb,
        ColorModel::Yuv => rgb_to_yuv,
    };
    let [a, b, c] = &mut image.planes;
    a.par_iter_mut()
        .zip(b.par_iter_mut())
        .zip(c.par_iter_mut())
        .for_each(|((a, b), c)| {
            (*a, *b, *c) = f(*a, *b, *c);
        });
    image.model = model;
}
