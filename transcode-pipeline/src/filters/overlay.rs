//! `overlay`: draws a second picture stream on top of the first.
//!
//! Each main picture is combined with the latest overlay picture whose pts
//! is not after it. A main picture waits until the overlay stream has moved
//! past its pts or ended. When the overlay stream ends its last picture
//! stays on screen.

use super::UnitSlot;
use crate::node::{FilterNode, NodeContext};
use crate::pad::{FormatConstraint, LinkFormat, PadDescriptor, VideoConstraint};
use tracing::{debug, trace};
use transcode_core::{
    Buffer, Error, OptionSchema, Options, PixelFormat, Result, RetrieveStatus, TimeBase,
    VideoFormat,
};

/// Pixel formats `overlay` composes.
pub(crate) const OVERLAY_FORMATS: &[PixelFormat] = &[
    PixelFormat::Yuv420p,
    PixelFormat::Yuv422p,
    PixelFormat::Yuv444p,
    PixelFormat::Gray8,
    PixelFormat::Rgb24,
    PixelFormat::Bgr24,
    PixelFormat::Rgba,
    PixelFormat::Bgra,
];

const MAIN: usize = 0;
const OVER: usize = 1;

/// Two inputs (main, overlay), one output in the main format.
#[derive(Debug)]
pub struct Overlay {
    x: u32,
    y: u32,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    main_format: Option<VideoFormat>,
    overlay_format: Option<VideoFormat>,
    time_base: TimeBase,
    main: Option<Buffer>,
    main_eof: bool,
    current: Option<Buffer>,
    next: Option<Buffer>,
    overlay_eof: bool,
    ready: UnitSlot,
}

impl Overlay {
    /// Place the overlay's top-left corner at `(x, y)`.
    pub fn new(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            inputs: vec![PadDescriptor::video("main"), PadDescriptor::video("overlay")],
            outputs: vec![PadDescriptor::video("default")],
            main_format: None,
            overlay_format: None,
            time_base: TimeBase::default(),
            main: None,
            main_eof: false,
            current: None,
            next: None,
            overlay_eof: false,
            ready: UnitSlot::default(),
        }
    }

    pub(crate) fn schema() -> OptionSchema {
        OptionSchema::new()
            .int("x", 0, 0, 16384, "horizontal offset")
            .int("y", 0, 0, 16384, "vertical offset")
    }

    pub(crate) fn from_options(options: &Options) -> Result<Self> {
        Ok(Self::new(options.usize("x")? as u32, options.usize("y")? as u32))
    }

    /// Compose whatever main pictures are decidable.
    fn advance(&mut self) -> Result<()> {
        while self.ready.has_room() {
            let Some(main_pts) = self.main.as_ref().map(|m| m.pts) else {
                if self.main_eof {
                    self.ready.finish();
                }
                return Ok(());
            };
            while self.next.as_ref().is_some_and(|n| n.pts <= main_pts) {
                self.current = self.next.take();
            }
            if self.next.is_none() && !self.overlay_eof {
                return Ok(());
            }
            let Some(main) = self.main.take() else {
                return Ok(());
            };
            let composed = self.compose(main)?;
            self.ready.put(composed)?;
        }
        Ok(())
    }

    fn compose(&self, mut main: Buffer) -> Result<Buffer> {
        let (Some(over), Some(main_fmt), Some(over_fmt)) =
            (self.current.as_ref(), self.main_format, self.overlay_format)
        else {
            return Ok(main);
        };
        if self.x >= main_fmt.width || self.y >= main_fmt.height {
            return Ok(main);
        }
        trace!(pts = main.pts, overlay_pts = over.pts, "composing");
        let pixel_format = main_fmt.pixel_format;
        let blend = pixel_format.has_alpha();
        let (hsub, vsub) = pixel_format.chroma_subsampling();
        let bpp = pixel_format.plane_row_bytes(0, 1);
        main.make_writable()?;
        let planes = main.planes_mut()?;
        for (p, dst) in planes.iter_mut().enumerate() {
            let Some(src) = over.planes().get(p) else {
                break;
            };
            let (sx, sy) = if p == 0 { (1, 1) } else { (hsub, vsub) };
            let px = (self.x / sx) as usize * bpp;
            let py = (self.y / sy) as usize;
            let dst_width = pixel_format.plane_row_bytes(p, main_fmt.width);
            let dst_rows = pixel_format.plane_rows(p, main_fmt.height);
            let width = pixel_format
                .plane_row_bytes(p, over_fmt.width)
                .min(dst_width.saturating_sub(px));
            let rows = pixel_format
                .plane_rows(p, over_fmt.height)
                .min(dst_rows.saturating_sub(py));
            for row in 0..rows {
                let (Some(from), Some(to)) = (src.row(row, width), dst.row_mut(py + row, px + width))
                else {
                    return Err(Error::corrupt(format!("overlay plane {p} is too small")));
                };
                let to = &mut to[px..];
                if blend {
                    blend_row(to, from);
                } else {
                    to.copy_from_slice(from);
                }
            }
        }
        Ok(main)
    }
}

/// Alpha-blend 4-byte pixels with alpha last.
fn blend_row(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u32::from(s[3]);
        for c in 0..3 {
            d[c] = ((u32::from(s[c]) * a + u32::from(d[c]) * (255 - a) + 127) / 255) as u8;
        }
        d[3] = (a + u32::from(d[3]) * (255 - a) / 255).min(255) as u8;
    }
}

impl FilterNode for Overlay {
    fn kind(&self) -> &'static str {
        "overlay"
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn input_constraint(&self, pad: usize, negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        let main = negotiated
            .get(MAIN)
            .and_then(Option::as_ref)
            .and_then(LinkFormat::video);
        match (pad, main) {
            (OVER, Some(main)) => FormatConstraint::host_video([main.pixel_format]),
            _ => FormatConstraint::host_video(OVERLAY_FORMATS),
        }
    }

    fn init(&mut self, inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let (Some(main), Some(over)) = (inputs.get(MAIN), inputs.get(OVER)) else {
            return Err(Error::invalid_state("overlay needs two inputs"));
        };
        let (Some(main_fmt), Some(over_fmt)) = (main.video(), over.video()) else {
            return Err(Error::invalid_config("overlay needs pictures on both inputs"));
        };
        let accepted = VideoConstraint::new().with_pixel_formats([main_fmt.pixel_format]);
        if !FormatConstraint::Video(accepted).accepts(over) {
            return Err(Error::invalid_config(format!(
                "overlay picture '{over_fmt}' does not match main '{main_fmt}'"
            )));
        }
        self.main_format = Some(main_fmt);
        self.overlay_format = Some(over_fmt);
        self.time_base = main.time_base();
        debug!(parent: ctx.logger.span(), x = self.x, y = self.y, main = %main_fmt, overlay = %over_fmt, "overlay ready");
        Ok(vec![main.clone()])
    }

    fn has_capacity(&self, pad: usize) -> bool {
        match pad {
            MAIN => self.main.is_none() && !self.main_eof,
            _ => self.next.is_none() && !self.overlay_eof,
        }
    }

    fn push(&mut self, pad: usize, input: Option<Buffer>) -> Result<()> {
        if !self.has_capacity(pad) && input.is_some() {
            return Err(Error::invalid_state(format!("overlay input {pad} is full")));
        }
        match (pad, input) {
            (MAIN, Some(unit)) => self.main = Some(unit),
            (MAIN, None) => self.main_eof = true,
            (_, Some(mut unit)) => {
                unit.rescale_ts(self.time_base);
                self.next = Some(unit);
            }
            (_, None) => self.overlay_eof = true,
        }
        self.advance()
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        self.advance()?;
        let status = self.ready.take(output);
        self.advance()?;
        Ok(status)
    }

    fn reset(&mut self) {
        self.main = None;
        self.main_eof = false;
        self.current = None;
        self.next = None;
        self.overlay_eof = false;
        self.ready.clear();
    }

    fn uninit(&mut self) {
        self.reset();
        self.main_format = None;
        self.overlay_format = None;
    }
}
