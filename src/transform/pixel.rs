//! Pixel conversion and plane scaling

use crate::error::{MediaError, Result};
use crate::frame::{Picture, PixelFormat, VideoFrame};

/// BT.601 studio-range conversion of a `0xRRGGBB` color
pub fn rgb_to_yuv(rgb: u32) -> [u8; 3] {
    let r = ((rgb >> 16) & 0xff) as u8;
    let g = ((rgb >> 8) & 0xff) as u8;
    let b = (rgb & 0xff) as u8;
    pixel_to_yuv(r, g, b)
}

fn pixel_to_yuv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let y = 0.257 * r + 0.504 * g + 0.098 * b + 16.0;
    let u = 0.439 * r - 0.368 * g - 0.071 * b + 128.0;
    let v = -0.148 * r - 0.291 * g + 0.439 * b + 128.0;
    [y as u8, u as u8, v as u8]
}

/// Convert a packed RGB variant to `Yuva420p`.
///
/// Chroma is the average of each 2x2 block.
pub fn packed_to_yuva(frame: &VideoFrame) -> Result<Picture> {
    let offsets = frame.format.rgba_offsets().ok_or_else(|| {
        MediaError::InvalidFrame(format!("{:?} is not a packed RGB format", frame.format))
    })?;
    let (w, h) = (frame.width as usize, frame.height as usize);
    let mut pic = Picture::new(frame.width, frame.height, PixelFormat::Yuva420p);
    let cw = pic.stride(1);

    // chroma accumulators per 2x2 block
    let mut u_acc = vec![0u32; cw * ((h + 1) / 2)];
    let mut v_acc = vec![0u32; u_acc.len()];
    let mut counts = vec![0u32; u_acc.len()];

    for y in 0..h {
        let row = frame.row(0, y);
        if row.len() < w * 4 {
            return Err(MediaError::InvalidFrame("short RGB row".into()).into());
        }
        for x in 0..w {
            let px = &row[x * 4..x * 4 + 4];
            let [yy, u, v] = pixel_to_yuv(px[offsets[0]], px[offsets[1]], px[offsets[2]]);
            pic.planes[0][y * w + x] = yy;
            pic.planes[3][y * w + x] = px[offsets[3]];
            let ci = (y / 2) * cw + x / 2;
            u_acc[ci] += u as u32;
            v_acc[ci] += v as u32;
            counts[ci] += 1;
        }
    }
    for i in 0..counts.len() {
        let n = counts[i].max(1);
        pic.planes[1][i] = (u_acc[i] / n) as u8;
        pic.planes[2][i] = (v_acc[i] / n) as u8;
    }
    Ok(pic)
}

/// Bilinear resize of one 8-bit plane
pub fn scale_plane(
    src: &VideoFrame,
    index: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let (src_w, src_h) = src.format.plane_size(index, src.width, src.height);
    let mut out = vec![0u8; dst_w * dst_h];
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return out;
    }
    if src_w == dst_w && src_h == dst_h {
        for y in 0..dst_h {
            let row = src.row(index, y);
            let n = row.len().min(dst_w);
            out[y * dst_w..y * dst_w + n].copy_from_slice(&row[..n]);
        }
        return out;
    }

    let sx = src_w as f32 / dst_w as f32;
    let sy = src_h as f32 / dst_h as f32;
    for y in 0..dst_h {
        let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, (src_h - 1) as f32);
        let y0 = fy as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let wy = fy - y0 as f32;
        let r0 = src.row(index, y0);
        let r1 = src.row(index, y1);
        if r0.len() < src_w || r1.len() < src_w {
            continue;
        }
        for x in 0..dst_w {
            let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, (src_w - 1) as f32);
            let x0 = fx as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let wx = fx - x0 as f32;
            let top = r0[x0] as f32 * (1.0 - wx) + r0[x1] as f32 * wx;
            let bottom = r1[x0] as f32 * (1.0 - wx) + r1[x1] as f32 * wx;
            out[y * dst_w + x] = (top * (1.0 - wy) + bottom * wy).round() as u8;
        }
    }
    out
}

/// Resize a planar picture
pub fn scale_picture(src: &VideoFrame, dst_w: u32, dst_h: u32) -> Result<Picture> {
    if src.format.is_packed_rgb() {
        return Err(MediaError::InvalidFrame("packed RGB must be converted first".into()).into());
    }
    let mut pic = Picture::new(dst_w, dst_h, src.format);
    for i in 0..src.format.plane_count() {
        let (w, h) = src.format.plane_size(i, dst_w, dst_h);
        pic.planes[i] = scale_plane(src, i, w, h);
    }
    Ok(pic)
}
