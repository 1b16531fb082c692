//! Video compositor

use crate::frame::{Picture, SharedFrame, VideoFrame};
use crate::transform::{overlay, rgb_to_yuv};

/// Frames composed before output starts regardless of content
pub const DEFAULT_BLANK_FRAME_THRESHOLD: u64 = 25 * 4;

/// Composes input pictures onto a fixed-size `Yuv420p` canvas
///
/// Output is held back while the canvas is pure background, until either
/// some input draws a visible pixel or the blank threshold is reached. Once
/// output has started it never stops.
#[derive(Debug)]
pub struct VideoMuxer {
    width: u32,
    height: u32,
    background: u32,
    blank_threshold: u64,
    frame_count: u64,
    muxing: bool,
}

impl VideoMuxer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: 0x000000,
            blank_threshold: DEFAULT_BLANK_FRAME_THRESHOLD,
            frame_count: 0,
            muxing: false,
        }
    }

    pub fn with_blank_threshold(mut self, frames: u64) -> Self {
        self.blank_threshold = frames;
        self
    }

    pub fn set_background(&mut self, rgb: u32) {
        self.background = rgb;
    }

    pub fn background(&self) -> u32 {
        self.background
    }

    pub fn is_muxing(&self) -> bool {
        self.muxing
    }

    /// Compose `frames` bottom to top by ascending Z.
    ///
    /// Returns `None` while blank output is being suppressed.
    pub fn mux(&mut self, frames: &[Option<SharedFrame>]) -> Option<VideoFrame> {
        let yuv = rgb_to_yuv(self.background);
        let mut canvas = Picture::filled(self.width, self.height, yuv, None);

        let mut layers: Vec<&VideoFrame> = Vec::with_capacity(frames.len());
        for frame in frames {
            match frame.as_ref().and_then(|f| f.as_video()) {
                Some(video) => layers.push(video),
                None => tracing::warn!("Compositor got a null video frame"),
            }
        }
        layers.sort_by_key(|f| f.z);

        for layer in layers {
            overlay(&mut canvas, layer, layer.x, layer.y, true);
        }

        if !self.muxing && (!is_background(&canvas, yuv) || self.frame_count >= self.blank_threshold) {
            tracing::debug!(frames = self.frame_count, "Compositor output started");
            self.muxing = true;
        }
        self.frame_count += 1;

        if self.muxing {
            Some(canvas.into_frame())
        } else {
            None
        }
    }
}

fn is_background(canvas: &Picture, yuv: [u8; 3]) -> bool {
    canvas.planes[1].iter().all(|v| *v == yuv[1])
        && canvas.planes[2].iter().all(|v| *v == yuv[2])
        && canvas.planes[0].iter().all(|v| *v == yuv[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Codec, MediaFrame};
    use proptest::prelude::*;

    fn layer(w: u32, h: u32, yuv: [u8; 3], x: i32, y: i32, z: i32) -> Option<SharedFrame> {
        let frame = Picture::filled(w, h, yuv, None).into_frame().positioned(x, y, z);
        Some(MediaFrame::video(Codec::RawVideo, 0, frame).shared())
    }

    #[test]
    fn test_blank_suppressed_until_threshold() {
        let mut muxer = VideoMuxer::new(16, 16).with_blank_threshold(3);
        assert!(muxer.mux(&[]).is_none());
        assert!(muxer.mux(&[]).is_none());
        assert!(muxer.mux(&[]).is_none());
        let out = muxer.mux(&[]).unwrap();
        assert_eq!(out.row(0, 0)[0], 16);
        assert!(muxer.is_muxing());
    }

    #[test]
    fn test_content_starts_output_immediately() {
        let mut muxer = VideoMuxer::new(16, 16);
        let out = muxer.mux(&[layer(4, 4, [200, 128, 128], 0, 0, 0)]).unwrap();
        assert_eq!(out.row(0, 0)[0], 200);
        assert_eq!(out.row(0, 0)[4], 16);
        // output continues even when inputs go away
        assert!(muxer.mux(&[]).is_some());
    }

    #[test]
    fn test_background_color() {
        let mut muxer = VideoMuxer::new(4, 4).with_blank_threshold(0);
        muxer.set_background(0xff0000);
        let out = muxer.mux(&[]).unwrap();
        assert_eq!(out.row(0, 0), &[81, 81, 81, 81]);
        assert_eq!(out.row(1, 0), &[239, 239]);
        assert_eq!(out.row(2, 0), &[90, 90]);
    }

    #[test]
    fn test_null_frames_skipped() {
        let mut muxer = VideoMuxer::new(8, 8);
        let out = muxer.mux(&[None, layer(8, 8, [99, 1, 2], 0, 0, 0), None]).unwrap();
        assert_eq!(out.row(0, 7)[7], 99);
    }

    #[test]
    fn test_higher_z_on_top() {
        let mut muxer = VideoMuxer::new(8, 8);
        let top = layer(8, 8, [50, 128, 128], 0, 0, 5);
        let bottom = layer(8, 8, [150, 128, 128], 0, 0, 1);
        let out = muxer.mux(&[top, bottom]).unwrap();
        assert_eq!(out.row(0, 0)[0], 50);
    }

    proptest! {
        #[test]
        fn prop_z_order_independent_of_input_order(
            zs in proptest::collection::vec(-5i32..5, 1..6),
            rotate in 0usize..6,
        ) {
            let frames: Vec<_> = zs.iter().enumerate()
                .map(|(i, z)| layer(8, 8, [20 + i as u8 * 30, 128, 128], i as i32, 0, *z))
                .collect();
            let mut rotated = frames.clone();
            let len = rotated.len();
            rotated.rotate_left(rotate % len);

            // equal Z keeps input order, so compare only when Z values are distinct
            let mut sorted = zs.clone();
            sorted.sort();
            sorted.dedup();
            prop_assume!(sorted.len() == zs.len());

            let a = VideoMuxer::new(16, 8).with_blank_threshold(0).mux(&frames).unwrap();
            let b = VideoMuxer::new(16, 8).with_blank_threshold(0).mux(&rotated).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
