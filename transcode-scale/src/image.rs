//! Unpacking pictures to full-resolution component planes and back.
//!
//! Every supported [`PixelFormat`] unpacks to three `width * height`
//! component planes in either YUV or RGB order, plus an optional alpha
//! plane. Subsampled chroma is replicated on unpack and box-averaged on
//! pack.

use crate::error::{Result, ScaleError};
use transcode_core::{PixelFormat, Plane, VideoFormat};

/// Colour model of an unpacked image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    /// Y, Cb, Cr (full range, BT.601).
    Yuv,
    /// R, G, B.
    Rgb,
}

impl ColorModel {
    /// Get the model a pixel format stores.
    pub fn of(format: PixelFormat) -> Self {
        if format.is_rgb() {
            Self::Rgb
        } else {
            Self::Yuv
        }
    }
}

/// A picture as full-resolution 8-bit component planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Component order of `planes`.
    pub model: ColorModel,
    /// Three component planes.
    pub planes: [Vec<u8>; 3],
    /// Alpha plane, when the source had one.
    pub alpha: Option<Vec<u8>>,
}

/// Check that `format` can be converted at all.
pub fn check_supported(format: PixelFormat) -> Result<()> {
    if format.is_high_depth() {
        return Err(ScaleError::UnsupportedFormat(format));
    }
    Ok(())
}

/// Byte offsets of R, G, B (and alpha) inside one packed pixel.
fn rgb_layout(format: PixelFormat) -> ([usize; 3], Option<usize>, usize) {
    match format {
        PixelFormat::Rgb24 => ([0, 1, 2], None, 3),
        PixelFormat::Bgr24 => ([2, 1, 0], None, 3),
        PixelFormat::Rgba => ([0, 1, 2], Some(3), 4),
        _ => ([2, 1, 0], Some(3), 4),
    }
}

fn too_small(plane: &Plane, p: usize, y: usize, width: usize) -> ScaleError {
    ScaleError::PlaneTooSmall {
        plane: p,
        actual: plane.len(),
        expected: y * plane.stride() + width,
    }
}

fn row(planes: &[Plane], p: usize, y: usize, width: usize) -> Result<&[u8]> {
    let plane = &planes[p];
    plane.row(y, width).ok_or_else(|| too_small(plane, p, y, width))
}

fn row_mut(planes: &mut [Plane], p: usize, y: usize, width: usize) -> Result<&mut [u8]> {
    let err = too_small(&planes[p], p, y, width);
    planes[p].row_mut(y, width).ok_or(err)
}

fn check_planes(format: VideoFormat, planes: &[Plane]) -> Result<()> {
    for p in 0..format.num_planes() {
        let plane = planes.get(p).ok_or(ScaleError::PlaneTooSmall {
            plane: p,
            actual: 0,
            expected: format.row_bytes(p) * format.rows(p),
        })?;
        let rows = format.rows(p);
        let row_bytes = format.row_bytes(p);
        let expected = plane.stride() * (rows - 1) + row_bytes;
        if plane.stride() < row_bytes || plane.len() < expected {
            return Err(ScaleError::PlaneTooSmall {
                plane: p,
                actual: plane.len(),
                expected,
            });
        }
    }
    Ok(())
}

/// Unpack `planes` laid out as `format`.
pub fn unpack(format: VideoFormat, planes: &[Plane]) -> Result<Image> {
    check_supported(format.pixel_format)?;
    check_planes(format, planes)?;
    let (w, h) = (format.width as usize, format.height as usize);
    let pix = format.pixel_format;
    let (hs, vs) = pix.chroma_subsampling();
    let (hs, vs) = (hs as usize, vs as usize);
    let mut out = [vec![0u8; w * h], vec![0u8; w * h], vec![0u8; w * h]];
    let mut alpha = None;

    match pix {
        PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => {
            for y in 0..h {
                out[0][y * w..(y + 1) * w].copy_from_slice(row(planes, 0, y, w)?);
                for c in 1..3 {
                    let src = row(planes, c, y / vs, format.row_bytes(c))?;
                    for x in 0..w {
                        out[c][y * w + x] = src[x / hs];
                    }
                }
            }
        }
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let (u, v) = if pix == PixelFormat::Nv12 { (0, 1) } else { (1, 0) };
            for y in 0..h {
                out[0][y * w..(y + 1) * w].copy_from_slice(row(planes, 0, y, w)?);
                let src = row(planes, 1, y / vs, format.row_bytes(1))?;
                for x in 0..w {
                    out[1][y * w + x] = src[(x / hs) * 2 + u];
                    out[2][y * w + x] = src[(x / hs) * 2 + v];
                }
            }
        }
        PixelFormat::Gray8 => {
            for y in 0..h {
                out[0][y * w..(y + 1) * w].copy_from_slice(row(planes, 0, y, w)?);
            }
            out[1].fill(128);
            out[2].fill(128);
        }
        _ => {
            let (offsets, alpha_offset, bpp) = rgb_layout(pix);
            let mut a = alpha_offset.map(|_| vec![0u8; w * h]);
            for y in 0..h {
                let line = row(planes, 0, y, w * bpp)?;
                for (x, px) in line.chunks_exact(bpp).enumerate() {
                    for c in 0..3 {
                        out[c][y * w + x] = px[offsets[c]];
                    }
                    if let (Some(a), Some(off)) = (a.as_mut(), alpha_offset) {
                        a[y * w + x] = px[off];
                    }
                }
            }
            alpha = a.take();
        }
    }

    Ok(Image {
        width: w,
        height: h,
        model: ColorModel::of(pix),
        planes: out,
        alpha,
    })
}

/// Average of the `hs x vs` block at chroma position (`cx`, `cy`).
fn block_average(plane: &[u8], w: usize, h: usize, cx: usize, cy: usize, hs: usize, vs: usize) -> u8 {
    let (mut sum, mut count) = (0u32, 0u32);
    for y in cy * vs..((cy + 1) * vs).min(h) {
        for x in cx * hs..((cx + 1) * hs).min(w) {
            sum += u32::from(plane[y * w + x]);
            count += 1;
        }
    }
    ((sum + count / 2) / count.max(1)) as u8
}

/// Pack `image` into freshly allocated planes laid out as `format`.
///
/// The image must already be in the colour model of `format` and have the
/// same dimensions.
pub fn pack(image: &Image, format: VideoFormat) -> Result<Vec<Plane>> {
    check_supported(format.pixel_format)?;
    let (w, h) = (image.width, image.height);
    if w != format.width as usize || h != format.height as usize {
        return Err(ScaleError::InvalidDimensions {
            width: format.width,
            height: format.height,
        });
    }
    let pix = format.pixel_format;
    let (hs, vs) = pix.chroma_subsampling();
    let (hs, vs) = (hs as usize, vs as usize);
    let mut planes: Vec<Plane> = (0..format.num_planes())
        .map(|p| Plane::new(vec![0u8; format.aligned_stride(p) * format.rows(p)], format.aligned_stride(p)))
        .collect();

    match pix {
        PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => {
            for y in 0..h {
                row_mut(&mut planes, 0, y, w)?.copy_from_slice(&image.planes[0][y * w..(y + 1) * w]);
            }
            for c in 1..3 {
                let cw = format.row_bytes(c);
                for cy in 0..format.rows(c) {
                    let line = row_mut(&mut planes, c, cy, cw)?;
                    for (cx, out) in line.iter_mut().enumerate() {
                        *out = block_average(&image.planes[c], w, h, cx, cy, hs, vs);
                    }
                }
            }
        }
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let (u, v) = if pix == PixelFormat::Nv12 { (1, 2) } else { (2, 1) };
            for y in 0..h {
                row_mut(&mut planes, 0, y, w)?.copy_from_slice(&image.planes[0][y * w..(y + 1) * w]);
            }
            let cw = format.row_bytes(1);
            for cy in 0..format.rows(1) {
                let line = row_mut(&mut planes, 1, cy, cw)?;
                for (cx, pair) in line.chunks_exact_mut(2).enumerate() {
                    pair[0] = block_average(&image.planes[u], w, h, cx, cy, hs, vs);
                    pair[1] = block_average(&image.planes[v], w, h, cx, cy, hs, vs);
                }
            }
        }
        PixelFormat::Gray8 => {
            for y in 0..h {
                row_mut(&mut planes, 0, y, w)?.copy_from_slice(&image.planes[0][y * w..(y + 1) * w]);
            }
        }
        _ => {
            let (offsets, alpha_offset, bpp) = rgb_layout(pix);
            for y in 0..h {
                let line = row_mut(&mut planes, 0, y, w * bpp)?;
                for (x, px) in line.chunks_exact_mut(bpp).enumerate() {
                    let i = y * w + x;
                    for c in 0..3 {
                        px[offsets[c]] = image.planes[c][i];
                    }
                    if let Some(off) = alpha_offset {
                        px[off] = image.alpha.as_ref().map_or(255, |a| a[i]);
                    }
                }
            }
        }
    }
    Ok(planes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(format: VideoFormat, data: &[u8]) -> Vec<Plane> {
        let mut offset = 0;
        (0..format.num_planes())
            .map(|p| {
                let size = format.row_bytes(p) * format.rows(p);
                let plane = Plane::new(data[offset..offset + size].to_vec(), format.row_bytes(p));
                offset += size;
                plane
            })
            .collect()
    }

    #[test]
    fn test_yuv420p_odd_size_round_trip() {
        let format = VideoFormat::new(3, 3, PixelFormat::Yuv420p);
        // Constant chroma survives averaging unchanged.
        let mut data: Vec<u8> = (0..9).collect();
        data.extend([50; 4]);
        data.extend([200; 4]);
        let image = unpack(format, &packed(format, &data)).unwrap();
        assert_eq!(image.model, ColorModel::Yuv);
        assert_eq!(image.planes[1], vec![50; 9]);

        let planes = pack(&image, format).unwrap();
        assert_eq!(planes[0].row(2, 3).unwrap(), &[6, 7, 8]);
        assert_eq!(planes[2].row(1, 2).unwrap(), &[200, 200]);
    }

    #[test]
    fn test_nv21_swaps_chroma() {
        let format = VideoFormat::new(2, 2, PixelFormat::Nv21);
        let data = [1, 2, 3, 4, 90, 10];
        let image = unpack(format, &packed(format, &data)).unwrap();
        assert_eq!(image.planes[1], vec![10; 4]);
        assert_eq!(image.planes[2], vec![90; 4]);

        let nv12 = VideoFormat::new(2, 2, PixelFormat::Nv12);
        let planes = pack(&image, nv12).unwrap();
        assert_eq!(planes[1].row(0, 2).unwrap(), &[10, 90]);
    }

    #[test]
    fn test_bgra_alpha_preserved() {
        let format = VideoFormat::new(1, 1, PixelFormat::Bgra);
        let image = unpack(format, &packed(format, &[1, 2, 3, 4])).unwrap();
        assert_eq!(image.planes, [vec![3], vec![2], vec![1]]);
        assert_eq!(image.alpha, Some(vec![4]));
        let rgba = pack(&image, VideoFormat::new(1, 1, PixelFormat::Rgba)).unwrap();
        assert_eq!(rgba[0].row(0, 4).unwrap(), &[3, 2, 1, 4]);
        let rgb = pack(&image, VideoFormat::new(1, 1, PixelFormat::Rgb24)).unwrap();
        assert_eq!(rgb[0].row(0, 3).unwrap(), &[3, 2, 1]);
    }

    #[test]
    fn test_opaque_alpha_added() {
        let format = VideoFormat::new(1, 1, PixelFormat::Rgb24);
        let image = unpack(format, &packed(format, &[9, 8, 7])).unwrap();
        let rgba = pack(&image, VideoFormat::new(1, 1, PixelFormat::Rgba)).unwrap();
        assert_eq!(rgba[0].row(0, 4).unwrap(), &[9, 8, 7, 255]);
    }

    #[test]
    fn test_short_plane_rejected() {
        let format = VideoFormat::new(4, 4, PixelFormat::Gray8);
        let planes = vec![Plane::new(vec![0; 15], 4)];
        assert!(matches!(
            unpack(format, &planes),
            Err(ScaleError::PlaneTooSmall { plane: 0, .. })
        ));
    }

    #[test]
    fn test_high_depth_unsupported() {
        let format = VideoFormat::new(2, 2, PixelFormat::Gray16);
        assert!(matches!(
            unpack(format, &[]),
            Err(ScaleError::UnsupportedFormat(PixelFormat::Gray16))
        ));
    }
}
