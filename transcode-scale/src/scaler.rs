//! Plane resampling.
//!
//! Rows of the destination are computed independently on the rayon pool.
//! Sample positions use pixel centres, so scaling by an integer factor and
//! back with nearest neighbour is lossless.

use crate::image::Image;
use rayon::prelude::*;

/// Interpolation used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleFilter {
    /// Nearest neighbour.
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Bilinear,
}

impl ScaleFilter {
    /// Get the filter name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "neighbor",
            Self::Bilinear => "bilinear",
        }
    }
}

impl std::str::FromStr for ScaleFilter {
    type Err = transcode_core::Error;

    fn from_str(s: &str) -> transcode_core::Result<Self> {
        match s {
            "neighbor" | "nearest" | "point" => Ok(Self::Nearest),
            "bilinear" | "fast_bilinear" => Ok(Self::Bilinear),
            other => Err(transcode_core::Error::invalid_option(
                "flags",
                format!("unknown scaling filter '{other}'"),
            )),
        }
    }
}

/// Source coordinate and weight of the next sample for each destination index.
fn bilinear_taps(src: usize, dst: usize) -> Vec<(usize, usize, f32)> {
    let ratio = src as f32 / dst as f32;
    (0..dst)
        .map(|i| {
            let pos = ((i as f32 + 0.5) * ratio - 0.5).max(0.0);
            let i0 = (pos.floor() as usize).min(src - 1);
            let i1 = (i0 + 1).min(src - 1);
            (i0, i1, pos - i0 as f32)
        })
        .collect()
}

fn nearest_taps(src: usize, dst: usize) -> Vec<usize> {
    (0..dst)
        .map(|i| ((2 * i + 1) * src / (2 * dst)).min(src - 1))
        .collect()
}

/// Resize one `sw x sh` plane to `dw x dh`.
pub fn scale_plane(
    src: &[u8],
    (sw, sh): (usize, usize),
    (dw, dh): (usize, usize),
    filter: ScaleFilter,
) -> Vec<u8> {
    if (sw, sh) == (dw, dh) {
        return src.to_vec();
    }
    let mut dst = vec![0u8; dw * dh];
    match filter {
        ScaleFilter::Nearest => {
            let xs = nearest_taps(sw, dw);
            let ys = nearest_taps(sh, dh);
            dst.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
                let line = &src[ys[y] * sw..(ys[y] + 1) * sw];
                for (out, &x) in row.iter_mut().zip(&xs) {
                    *out = line[x];
                }
            });
        }
        ScaleFilter::Bilinear => {
            let xs = bilinear_taps(sw, dw);
            let ys = bilinear_taps(sh, dh);
            dst.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
                let (y0, y1, fy) = ys[y];
                let top = &src[y0 * sw..(y0 + 1) * sw];
                let bottom = &src[y1 * sw..(y1 + 1) * sw];
                for (out, &(x0, x1, fx)) in row.iter_mut().zip(&xs) {
                    let t = f32::from(top[x0]) * (1.0 - fx) + f32::from(top[x1]) * fx;
                    let b = f32::from(bottom[x0]) * (1.0 - fx) + f32::from(bottom[x1]) * fx;
                    *out = (t * (1.0 - fy) + b * fy).round().clamp(0.0, 255.0) as u8;
                }
            });
        }
    }
    dst
}

/// Resize every plane of `image`.
pub fn scale_image(image: &Image, width: usize, height: usize, filter: ScaleFilter) -> Image {
    let src = (image.width, image.height);
    let dst = (width, height);
    Image {
        width,
        height,
        model: image.model,
        planes: [
            scale_plane(&image.planes[0], src, dst, filter),
            scale_plane(&image.planes[1], src, dst, filter),
            scale_plane(&image.planes[2], src, dst, filter),
        ],
        alpha: image
            .alpha
            .as_ref()
            .map(|a| scale_plane(a, src, dst, filter)),
    }
}
