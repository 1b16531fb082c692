//! Synthetic test-pattern stream
//!
//! Two generator threads feed a [`Stream`]: a solid-color picture every
//! `1/fps` and a mono sine tone in short frames. Both sleep through a
//! [`CancelToken`], so `stop` returns promptly.

use std::f64::consts::PI;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::frame::{AudioFrame, Codec, MediaFrame, Picture};
use crate::stream::{FrameProducer, Stream};
use crate::sync::CancelToken;
use crate::transform::rgb_to_yuv;

use super::config::CanvasConfig;

pub struct CanvasStream {
    config: CanvasConfig,
    stream: Arc<Stream>,
    cancel: CancelToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CanvasStream {
    pub fn new(id: impl Into<String>, config: CanvasConfig) -> Self {
        Self {
            config,
            stream: Arc::new(Stream::new(id)),
            cancel: CancelToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn start(&self) -> std::io::Result<()> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return Ok(());
        }
        let id = self.stream.id().to_string();

        let (stream, cancel, config) = (self.stream.clone(), self.cancel.clone(), self.config.clone());
        workers.push(
            std::thread::Builder::new()
                .name(format!("canvas-video-{}", id))
                .spawn(move || generate_video(&stream, &cancel, &config))?,
        );

        let (stream, cancel, config) = (self.stream.clone(), self.cancel.clone(), self.config.clone());
        workers.push(
            std::thread::Builder::new()
                .name(format!("canvas-audio-{}", id))
                .spawn(move || generate_audio(&stream, &cancel, &config))?,
        );
        tracing::info!(
            stream = %id,
            width = self.config.width,
            height = self.config.height,
            fps = self.config.fps,
            "Canvas stream started"
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!(stream = %self.stream.id(), "Canvas thread panicked");
            }
        }
    }
}

impl Drop for CanvasStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for CanvasStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasStream")
            .field("id", &self.stream.id())
            .field("config", &self.config)
            .finish()
    }
}

fn generate_video(stream: &Stream, cancel: &CancelToken, config: &CanvasConfig) {
    let picture = Picture::filled(config.width, config.height, rgb_to_yuv(config.background), None);
    let frame = MediaFrame::video(Codec::RawVideo, 0, picture.into_frame());
    let interval = Duration::from_secs(1) / config.fps.max(1);
    let mut pts = 0i64;
    while !cancel.is_cancelled() {
        stream.send_frame(frame.with_pts(pts).shared());
        if !cancel.sleep(interval) {
            break;
        }
        pts += interval.as_millis() as i64;
    }
}

/// One frame of the tone starting at sample `offset`
pub(crate) fn tone_frame(config: &CanvasConfig, offset: u64) -> AudioFrame {
    let rate = config.tone_rate.max(1);
    let count = (rate as u128 * config.audio_frame.as_millis() / 1000) as u64;
    let samples: Vec<i16> = (offset..offset + count)
        .map(|n| {
            let t = n as f64 / rate as f64;
            ((t * 2.0 * PI * config.tone_hz as f64).sin() * i16::MAX as f64) as i16
        })
        .collect();
    AudioFrame::from_s16(&samples, rate, 1)
}

fn generate_audio(stream: &Stream, cancel: &CancelToken, config: &CanvasConfig) {
    let step = config.audio_frame.as_millis() as i64;
    let mut pts = 0i64;
    let mut offset = 0u64;
    while !cancel.is_cancelled() {
        let frame = tone_frame(config, offset);
        offset += frame.nb_samples as u64;
        stream.send_frame(MediaFrame::audio(Codec::Pcm, pts, frame).shared());
        // generated twice as fast as real time; consumers keep the latest
        if !cancel.sleep(config.audio_frame / 2) {
            break;
        }
        pts += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StreamKind;
    use crate::stream::tests::CollectSink;
    use crate::stream::SinkRegistry;
    use std::time::Instant;

    #[test]
    fn test_tone_frame() {
        let config = CanvasConfig::default();
        let frame = tone_frame(&config, 0);
        assert_eq!(frame.nb_samples, 80);
        assert_eq!((frame.sample_rate, frame.channels), (8000, 1));
        let samples = frame.s16_samples().unwrap();
        assert_eq!(samples[0], 0);
        assert!(samples.iter().any(|s| *s > 30000));
    }

    #[test]
    fn test_generates_background_and_tone() {
        let canvas = CanvasStream::new(
            "c1",
            CanvasConfig {
                width: 16,
                height: 8,
                background: 0x0000ff,
                fps: 100,
                ..Default::default()
            },
        );
        let sink = CollectSink::new("collect");
        canvas.stream().add_sink(sink.clone());
        canvas.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let frames = sink.frames.lock();
            let video = frames.iter().filter(|f| f.kind() == StreamKind::Video).count();
            let audio = frames.iter().filter(|f| f.kind() == StreamKind::Audio).count();
            if (video >= 2 && audio >= 2) || Instant::now() > deadline {
                break;
            }
            drop(frames);
            std::thread::sleep(Duration::from_millis(5));
        }
        canvas.stop();

        let frames = sink.frames.lock();
        let videos: Vec<_> = frames.iter().filter_map(|f| f.as_video().map(|v| (f.pts, v.clone()))).collect();
        assert!(videos.len() >= 2);
        let [y, u, v] = rgb_to_yuv(0x0000ff);
        let (_, first) = &videos[0];
        assert_eq!((first.width, first.height), (16, 8));
        assert!(first.row(0, 0).iter().all(|p| *p == y));
        assert!(first.row(1, 0).iter().all(|p| *p == u));
        assert!(first.row(2, 0).iter().all(|p| *p == v));
        assert_eq!(videos[1].0 - videos[0].0, 10);
    }

    #[test]
    fn test_stop_is_prompt() {
        let canvas = CanvasStream::new("c2", CanvasConfig { fps: 1, ..Default::default() });
        canvas.start().unwrap();
        let started = Instant::now();
        canvas.stop();
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
