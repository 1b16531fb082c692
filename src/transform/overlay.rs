//! Picture overlay
//!
//! Draws a planar picture onto a canvas at an offset. Negative offsets and
//! overflow are clipped independently in X and Y.
//!
//! ```text
//!   canvas (dst)
//!   +-------------------------+
//!   |      (x, y)             |
//!   |        +--------+       |
//!   |        |  src   |       |
//!   |        +--------+       |
//!   +-------------------------+
//! ```
//!
//! With `blend` set and a `Yuva420p` source, each sample becomes
//! `(src * a + dst * (255 - a)) >> 8`. Chroma samples use the alpha value at
//! the top-left luma position of their 2x2 block.

use crate::frame::{Picture, PixelFormat, VideoFrame};

/// Clipped copy region along one axis: (src start, dst start, length)
fn clip_axis(offset: i32, src_len: usize, dst_len: usize) -> Option<(usize, usize, usize)> {
    if i64::from(offset) >= dst_len as i64 {
        return None;
    }
    let src_start = if offset < 0 { offset.unsigned_abs() as usize } else { 0 };
    let dst_start = offset.max(0) as usize;
    if src_start >= src_len {
        return None;
    }
    let len = (src_len - src_start).min(dst_len - dst_start);
    if len == 0 {
        return None;
    }
    Some((src_start, dst_start, len))
}

#[inline]
fn blend(src: u8, dst: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((src as u32 * a + dst as u32 * (255 - a)) >> 8) as u8
}

/// Overlay `src` onto `dst` with its top-left corner at (`x`, `y`).
///
/// `dst` must be planar; packed RGB sources are ignored.
pub fn overlay(dst: &mut Picture, src: &VideoFrame, x: i32, y: i32, blend_alpha: bool) {
    if src.format.is_packed_rgb() || dst.format.is_packed_rgb() {
        tracing::warn!(format = ?src.format, "overlay skipped: packed source or canvas");
        return;
    }
    let Some((sx, dx, w)) = clip_axis(x, src.width as usize, dst.width as usize) else {
        return;
    };
    let Some((sy, dy, h)) = clip_axis(y, src.height as usize, dst.height as usize) else {
        return;
    };

    let use_alpha = blend_alpha && src.format == PixelFormat::Yuva420p;

    // luma
    let dst_stride = dst.stride(0);
    for j in 0..h {
        let src_row = src.row(0, sy + j);
        let alpha_row = if use_alpha { src.row(3, sy + j) } else { &[] };
        if src_row.len() < sx + w {
            break;
        }
        let out = &mut dst.planes[0][(dy + j) * dst_stride + dx..(dy + j) * dst_stride + dx + w];
        if use_alpha && alpha_row.len() >= sx + w {
            for i in 0..w {
                out[i] = blend(src_row[sx + i], out[i], alpha_row[sx + i]);
            }
        } else {
            out.copy_from_slice(&src_row[sx..sx + w]);
        }
    }

    // chroma, halved offsets and sizes
    let (csx, cdx) = (sx / 2, dx / 2);
    let (csy, cdy) = (sy / 2, dy / 2);
    let (src_cw, src_ch) = src.format.plane_size(1, src.width, src.height);
    let (dst_cw, dst_ch) = dst.format.plane_size(1, dst.width, dst.height);
    let cw = ((w + 1) / 2).min(src_cw - csx.min(src_cw)).min(dst_cw - cdx.min(dst_cw));
    let ch = ((h + 1) / 2).min(src_ch - csy.min(src_ch)).min(dst_ch - cdy.min(dst_ch));
    for plane in 1..3 {
        for j in 0..ch {
            let src_row = src.row(plane, csy + j);
            if src_row.len() < csx + cw {
                break;
            }
            let alpha_row = if use_alpha {
                src.row(3, ((csy + j) * 2).min(src.height as usize - 1))
            } else {
                &[]
            };
            let start = (cdy + j) * dst_cw + cdx;
            let out = &mut dst.planes[plane][start..start + cw];
            if use_alpha && !alpha_row.is_empty() {
                for i in 0..cw {
                    let a = alpha_row[((csx + i) * 2).min(alpha_row.len() - 1)];
                    out[i] = blend(src_row[csx + i], out[i], a);
                }
            } else {
                out.copy_from_slice(&src_row[csx..csx + cw]);
            }
        }
    }

    // alpha plane only travels in normal mode
    if !blend_alpha && dst.format == PixelFormat::Yuva420p {
        let stride = dst.stride(3);
        for j in 0..h {
            let start = (dy + j) * stride + dx;
            let out = &mut dst.planes[3][start..start + w];
            if src.format == PixelFormat::Yuva420p {
                let row = src.row(3, sy + j);
                if row.len() >= sx + w {
                    out.copy_from_slice(&row[sx..sx + w]);
                }
            } else {
                out.fill(255);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, yuv: [u8; 3]) -> VideoFrame {
        Picture::filled(w, h, yuv, None).into_frame()
    }

    #[test]
    fn test_overlay_full_cover() {
        let mut canvas = Picture::filled(8, 8, [16, 128, 128], None);
        overlay(&mut canvas, &solid(8, 8, [81, 90, 240]), 0, 0, true);
        assert!(canvas.planes[0].iter().all(|v| *v == 81));
        assert!(canvas.planes[1].iter().all(|v| *v == 90));
        assert!(canvas.planes[2].iter().all(|v| *v == 240));
    }

    #[test]
    fn test_overlay_offset_region() {
        let mut canvas = Picture::filled(8, 8, [0, 0, 0], None);
        overlay(&mut canvas, &solid(4, 4, [200, 100, 50]), 2, 4, false);
        for y in 0..8 {
            for x in 0..8 {
                let inside = (2..6).contains(&x) && (4..8).contains(&y);
                let expected = if inside { 200 } else { 0 };
                assert_eq!(canvas.planes[0][y * 8 + x], expected, "({}, {})", x, y);
            }
        }
        // chroma block (1..3, 2..4)
        assert_eq!(canvas.planes[1][2 * 4 + 1], 100);
        assert_eq!(canvas.planes[1][0], 0);
    }

    #[test]
    fn test_overlay_negative_offsets_clip() {
        let mut canvas = Picture::filled(4, 4, [0, 0, 0], None);
        overlay(&mut canvas, &solid(4, 4, [9, 9, 9]), -2, -2, false);
        assert_eq!(canvas.planes[0][0], 9);
        assert_eq!(canvas.planes[0][1 * 4 + 1], 9);
        assert_eq!(canvas.planes[0][2], 0);
        assert_eq!(canvas.planes[0][2 * 4], 0);
    }

    #[test]
    fn test_overlay_negative_x_positive_y() {
        let mut canvas = Picture::filled(4, 4, [0, 0, 0], None);
        overlay(&mut canvas, &solid(4, 2, [7, 7, 7]), -2, 2, false);
        assert_eq!(canvas.planes[0][2 * 4], 7);
        assert_eq!(canvas.planes[0][3 * 4 + 1], 7);
        assert_eq!(canvas.planes[0][3 * 4 + 2], 0);
        assert_eq!(canvas.planes[0][0], 0);
    }

    #[test]
    fn test_overlay_outside_is_noop() {
        let mut canvas = Picture::filled(4, 4, [1, 1, 1], None);
        let before = canvas.clone();
        overlay(&mut canvas, &solid(2, 2, [9, 9, 9]), 4, 0, false);
        overlay(&mut canvas, &solid(2, 2, [9, 9, 9]), 0, 4, false);
        overlay(&mut canvas, &solid(2, 2, [9, 9, 9]), -2, 0, false);
        overlay(&mut canvas, &solid(2, 2, [9, 9, 9]), i32::MIN, i32::MIN, false);
        overlay(&mut canvas, &solid(2, 2, [9, 9, 9]), i32::MAX, 0, false);
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_alpha_blend() {
        let mut canvas = Picture::filled(2, 2, [0, 0, 0], None);
        let transparent = Picture::filled(2, 2, [200, 200, 200], Some(0)).into_frame();
        overlay(&mut canvas, &transparent, 0, 0, true);
        assert!(canvas.planes[0].iter().all(|v| *v == 0));

        let half = Picture::filled(2, 2, [200, 200, 200], Some(128)).into_frame();
        overlay(&mut canvas, &half, 0, 0, true);
        assert_eq!(canvas.planes[0][0], ((200u32 * 128) >> 8) as u8);
        assert_eq!(canvas.planes[1][0], ((200u32 * 128) >> 8) as u8);
    }

    #[test]
    fn test_normal_mode_copies_alpha() {
        let mut canvas = Picture::filled(4, 4, [0, 0, 0], Some(0));
        let src = Picture::filled(2, 2, [50, 50, 50], Some(77)).into_frame();
        overlay(&mut canvas, &src, 2, 2, false);
        assert_eq!(canvas.planes[3][2 * 4 + 2], 77);
        assert_eq!(canvas.planes[3][0], 0);
        assert_eq!(canvas.planes[0][3 * 4 + 3], 50);
    }
}
