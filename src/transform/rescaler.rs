//! Aspect-aware video rescaler
//!
//! Scales a picture into a fixed target rectangle according to a
//! [`StretchMode`], then draws it onto a background-colored canvas of the
//! target size.
//!
//! With `fo = W / H` (source) and `ft = W' / H'` (target):
//!
//! ```text
//!  fill:  ft > fo  -> zoom W' x W'/fo, centered vertically (crop top/bottom)
//!         else     -> zoom H'*fo x H', centered horizontally (crop sides)
//!  fit:   ft > fo  -> zoom H'*fo x H', centered horizontally (pad sides)
//!         else     -> zoom W' x W'/fo, centered vertically (pad top/bottom)
//!  scale: zoom W' x H' at (0, 0)
//! ```
//!
//! Packed RGB sources come out as `Yuva420p` with a transparent pad area;
//! everything else as `Yuv420p` padded with the background color.

use crate::error::{MediaError, Result};
use crate::frame::{Picture, PixelFormat, VideoFrame};
use crate::options::StretchMode;

use super::overlay::overlay;
use super::pixel::{packed_to_yuva, rgb_to_yuv, scale_picture};

/// Scaled picture size and its offset on the target canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

fn even_floor(v: f64) -> u32 {
    let v = (v + 1e-6).floor().max(2.0) as u32;
    v & !1
}

/// Compute where a `src_w` x `src_h` picture lands inside a `dst_w` x `dst_h` target
pub fn zoom_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, mode: StretchMode) -> ZoomRect {
    if mode == StretchMode::ScaleToFit || src_w == 0 || src_h == 0 || dst_h == 0 {
        return ZoomRect {
            x: 0,
            y: 0,
            width: dst_w,
            height: dst_h,
        };
    }
    let fo = src_w as f64 / src_h as f64;
    let ft = dst_w as f64 / dst_h as f64;

    let width_bound = match mode {
        StretchMode::AspectFill => ft > fo,
        _ => ft <= fo,
    };

    if width_bound {
        let height = even_floor(dst_w as f64 / fo);
        ZoomRect {
            x: 0,
            y: (dst_h as i32 - height as i32) / 2,
            width: dst_w,
            height,
        }
    } else {
        let width = even_floor(dst_h as f64 * fo);
        ZoomRect {
            x: (dst_w as i32 - width as i32) / 2,
            y: 0,
            width,
            height: dst_h,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceParams {
    width: u32,
    height: u32,
    format: PixelFormat,
}

#[derive(Debug)]
pub struct VideoRescaler {
    width: u32,
    height: u32,
    mode: StretchMode,
    background: u32,
    source: Option<SourceParams>,
    zoom: Option<ZoomRect>,
}

impl VideoRescaler {
    pub fn new(width: u32, height: u32, mode: StretchMode, background: u32) -> Self {
        Self {
            width,
            height,
            mode,
            background,
            source: None,
            zoom: None,
        }
    }

    pub fn target_width(&self) -> u32 {
        self.width
    }

    pub fn target_height(&self) -> u32 {
        self.height
    }

    pub fn mode(&self) -> StretchMode {
        self.mode
    }

    /// Change the target; the next frame re-initializes the scaler
    pub fn reset(&mut self, width: u32, height: u32, mode: StretchMode) {
        self.width = width;
        self.height = height;
        self.mode = mode;
        self.source = None;
        self.zoom = None;
    }

    pub fn set_background(&mut self, rgb: u32) {
        self.background = rgb;
    }

    fn init(&mut self, frame: &VideoFrame) -> ZoomRect {
        let params = SourceParams {
            width: frame.width,
            height: frame.height,
            format: frame.format,
        };
        if let (Some(source), Some(zoom)) = (self.source, self.zoom) {
            if source == params {
                return zoom;
            }
        }
        let zoom = zoom_rect(frame.width, frame.height, self.width, self.height, self.mode);
        tracing::debug!(
            src_w = frame.width,
            src_h = frame.height,
            src_format = ?frame.format,
            dst_w = self.width,
            dst_h = self.height,
            mode = self.mode.as_str(),
            zoom_w = zoom.width,
            zoom_h = zoom.height,
            "Rescaler initialized"
        );
        self.source = Some(params);
        self.zoom = Some(zoom);
        zoom
    }

    /// Rescale one picture onto a target-sized canvas
    pub fn rescale(&mut self, frame: &VideoFrame) -> Result<VideoFrame> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::InvalidFrame("rescale target has zero size".into()).into());
        }
        if !frame.is_valid() {
            return Err(MediaError::InvalidFrame("plane data shorter than declared size".into()).into());
        }
        let zoom = self.init(frame);

        let converted;
        let planar = if frame.format.is_packed_rgb() {
            converted = packed_to_yuva(frame)?.into_frame();
            &converted
        } else {
            frame
        };
        let scaled = scale_picture(planar, zoom.width, zoom.height)?.into_frame();

        let alpha = if planar.format == PixelFormat::Yuva420p {
            Some(0)
        } else {
            None
        };
        let mut canvas = Picture::filled(self.width, self.height, rgb_to_yuv(self.background), alpha);
        overlay(&mut canvas, &scaled, zoom.x, zoom.y, false);
        Ok(canvas.into_frame())
    }
}
