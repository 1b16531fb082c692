//! Audio resampler
//!
//! Converts arbitrary PCM into canonical S16 stereo 48 kHz and slices the
//! result into fixed-size frames. Samples that do not fill a whole frame are
//! carried into the next call.

use crate::error::{MediaError, Result};
use crate::frame::{
    AudioFrame, SampleFormat, AUDIO_FRAME_SAMPLES, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InputParams {
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
}

#[derive(Debug)]
pub struct AudioResampler {
    frame_size: usize,
    input: Option<InputParams>,
    /// Canonical interleaved samples waiting for a full frame
    carry: Vec<i16>,
    /// Fractional read position for rate conversion
    phase: f64,
    /// Last stereo sample of the previous call
    prev: Option<[f32; 2]>,
}

impl AudioResampler {
    pub fn new() -> Self {
        Self::with_frame_size(AUDIO_FRAME_SAMPLES)
    }

    pub fn with_frame_size(frame_size: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
            input: None,
            carry: Vec::new(),
            phase: 0.0,
            prev: None,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples per channel waiting in the carry buffer
    pub fn pending_samples(&self) -> usize {
        self.carry.len() / CANONICAL_CHANNELS as usize
    }

    /// Like [`resample`](Self::resample), stamping each output with a PTS.
    ///
    /// The first output starts where the carried samples started; later
    /// outputs follow at whole-frame steps in milliseconds.
    pub fn resample_timed(&mut self, pts: i64, frame: &AudioFrame) -> Result<Vec<(i64, AudioFrame)>> {
        let rate = CANONICAL_SAMPLE_RATE as i64;
        let base = pts - self.pending_samples() as i64 * 1000 / rate;
        let step = self.frame_size as i64 * 1000 / rate;
        Ok(self
            .resample(frame)?
            .into_iter()
            .enumerate()
            .map(|(i, out)| (base + i as i64 * step, out))
            .collect())
    }

    /// Convert `frame` and return every complete canonical frame now available
    pub fn resample(&mut self, frame: &AudioFrame) -> Result<Vec<AudioFrame>> {
        if frame.sample_rate == 0 || frame.channels == 0 {
            return Err(MediaError::InvalidFrame("audio frame without rate or channels".into()).into());
        }

        let params = InputParams {
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            format: frame.format,
        };
        if self.input != Some(params) {
            if self.input.is_some() {
                tracing::debug!(
                    rate = frame.sample_rate,
                    channels = frame.channels,
                    format = ?frame.format,
                    "Resampler input changed, reinitializing"
                );
            }
            self.input = Some(params);
            self.phase = 0.0;
            self.prev = None;
        }

        if frame.is_canonical() {
            let samples = frame
                .s16_samples()
                .ok_or_else(|| MediaError::InvalidFrame("missing sample buffer".into()))?;
            self.carry.extend_from_slice(&samples);
        } else {
            let stereo = to_stereo_f32(frame)?;
            let converted = self.convert_rate(&stereo, frame.sample_rate);
            self.carry.extend(converted.iter().flat_map(|s| {
                [to_s16(s[0]), to_s16(s[1])]
            }));
        }

        Ok(self.drain_frames())
    }

    fn drain_frames(&mut self) -> Vec<AudioFrame> {
        let chunk = self.frame_size * CANONICAL_CHANNELS as usize;
        let full = self.carry.len() / chunk;
        let mut frames = Vec::with_capacity(full);
        for i in 0..full {
            frames.push(AudioFrame::from_s16(
                &self.carry[i * chunk..(i + 1) * chunk],
                CANONICAL_SAMPLE_RATE,
                CANONICAL_CHANNELS,
            ));
        }
        self.carry.drain(..full * chunk);
        frames
    }

    /// Linear interpolation with phase continuity across calls
    fn convert_rate(&mut self, input: &[[f32; 2]], rate: u32) -> Vec<[f32; 2]> {
        if rate == CANONICAL_SAMPLE_RATE {
            return input.to_vec();
        }
        let mut ext = Vec::with_capacity(input.len() + 1);
        if let Some(prev) = self.prev {
            ext.push(prev);
        }
        ext.extend_from_slice(input);
        if ext.len() < 2 {
            self.prev = ext.last().copied();
            return Vec::new();
        }

        let step = rate as f64 / CANONICAL_SAMPLE_RATE as f64;
        let last = (ext.len() - 1) as f64;
        let mut out = Vec::with_capacity((input.len() as f64 / step) as usize + 1);
        let mut t = self.phase;
        while t < last {
            let i = t as usize;
            let frac = (t - i as f64) as f32;
            let (a, b) = (ext[i], ext[i + 1]);
            out.push([
                a[0] + (b[0] - a[0]) * frac,
                a[1] + (b[1] - a[1]) * frac,
            ]);
            t += step;
        }
        self.phase = t - last;
        self.prev = ext.last().copied();
        out
    }
}

impl Default for AudioResampler {
    fn default() -> Self {
        Self::new()
    }
}

fn to_s16(v: f32) -> i16 {
    (v * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

fn sample_at(frame: &AudioFrame, channel: usize, index: usize) -> f32 {
    let bps = frame.format.bytes_per_sample();
    let (buf, offset) = if frame.format.is_planar() {
        match frame.data.get(channel) {
            Some(b) => (b, index * bps),
            None => return 0.0,
        }
    } else {
        match frame.data.first() {
            Some(b) => (b, (index * frame.channels as usize + channel) * bps),
            None => return 0.0,
        }
    };
    let Some(s) = buf.get(offset..offset + bps) else {
        return 0.0;
    };
    match frame.format {
        SampleFormat::U8 => (s[0] as f32 - 128.0) / 128.0,
        SampleFormat::S16 | SampleFormat::S16p => i16::from_le_bytes([s[0], s[1]]) as f32 / 32768.0,
        SampleFormat::S32 => i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as f32 / 2_147_483_648.0,
        SampleFormat::F32 | SampleFormat::F32p => f32::from_le_bytes([s[0], s[1], s[2], s[3]]),
    }
}

/// Normalize to stereo f32; mono is duplicated, extra channels dropped
fn to_stereo_f32(frame: &AudioFrame) -> Result<Vec<[f32; 2]>> {
    if frame.data.is_empty() {
        return Err(MediaError::InvalidFrame("missing sample buffer".into()).into());
    }
    let right = if frame.channels >= 2 { 1 } else { 0 };
    Ok((0..frame.nb_samples)
        .map(|i| [sample_at(frame, 0, i), sample_at(frame, right, i)])
        .collect())
}
