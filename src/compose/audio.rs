//! Audio mixer

use crate::frame::{AudioFrame, SharedFrame};

/// Sums canonical audio frames into one canonical frame
#[derive(Debug, Default)]
pub struct AudioMixer;

impl AudioMixer {
    pub fn new() -> Self {
        Self
    }

    /// Mix `frames` over silence, saturating at the S16 range
    pub fn mix(&self, frames: &[Option<SharedFrame>]) -> AudioFrame {
        let silent = AudioFrame::silent();
        let mut acc: Vec<i32> = vec![0; silent.nb_samples * silent.channels as usize];

        for frame in frames {
            let Some(audio) = frame.as_ref().and_then(|f| f.as_audio()) else {
                tracing::warn!("Mixer got a null audio frame");
                continue;
            };
            let Some(samples) = audio.s16_samples() else {
                tracing::warn!(format = ?audio.format, "Mixer skipped non-S16 frame");
                continue;
            };
            for (dst, src) in acc.iter_mut().zip(samples.iter()) {
                *dst = (*dst + *src as i32).clamp(i16::MIN as i32, i16::MAX as i32);
            }
        }

        let mixed: Vec<i16> = acc.into_iter().map(|v| v as i16).collect();
        AudioFrame::from_s16(&mixed, silent.sample_rate, silent.channels)
    }
}

/// Scale S16 samples by `percent` (clamped to 0..=300), saturating
pub fn gain(frame: &AudioFrame, percent: i32) -> AudioFrame {
    let percent = percent.clamp(0, 300);
    let Some(samples) = frame.s16_samples() else {
        return frame.clone();
    };
    let scaled: Vec<i16> = samples
        .iter()
        .map(|s| (*s as i32 * percent / 100).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect();
    AudioFrame::from_s16(&scaled, frame.sample_rate, frame.channels)
}
