//! Input configuration

use std::time::Duration;

/// Input configuration options
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Deliver decoded frames no faster than their timestamps
    pub native_rate: bool,

    /// Repeat the first picture forever with silent audio
    pub single_frame: bool,

    /// Rescale pictures to the `w`/`h` options
    pub rescale: bool,

    /// Convert audio to canonical 48 kHz stereo S16 frames
    pub resample: bool,

    /// Reads that stall this long end the connection
    pub stall_timeout: Duration,

    /// Wait before reopening a source that failed
    pub retry_backoff: Duration,

    /// Picture interval in single-frame mode
    pub single_frame_interval: Duration,

    /// Queued pictures (newest kept)
    pub video_queue_depth: usize,

    /// Queued audio frames (newest kept)
    pub audio_queue_depth: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            native_rate: false,
            single_frame: false,
            rescale: true,
            resample: true,
            stall_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(1),
            single_frame_interval: Duration::from_millis(40),
            video_queue_depth: 1,
            audio_queue_depth: 100,
        }
    }
}

impl InputConfig {
    pub fn native_rate(mut self, enabled: bool) -> Self {
        self.native_rate = enabled;
        self
    }

    pub fn single_frame(mut self, enabled: bool) -> Self {
        self.single_frame = enabled;
        self
    }

    pub fn rescale(mut self, enabled: bool) -> Self {
        self.rescale = enabled;
        self
    }

    pub fn resample(mut self, enabled: bool) -> Self {
        self.resample = enabled;
        self
    }

    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Queue depths; zero is raised to one
    pub fn queue_depths(mut self, video: usize, audio: usize) -> Self {
        self.video_queue_depth = video.max(1);
        self.audio_queue_depth = audio.max(1);
        self
    }
}
