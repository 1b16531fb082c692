//! Byte counters and per-sink statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Bytes written since the last read
///
/// Writers add after every successful write; the stats poller reads and
/// clears in one step, so each byte is reported exactly once.
#[derive(Debug, Default)]
pub struct ByteCounter {
    pending: AtomicU64,
    total: AtomicU64,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.pending.fetch_add(bytes, Ordering::Relaxed);
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes since the previous call, then reset to zero
    pub fn take(&self) -> u64 {
        self.pending.swap(0, Ordering::Relaxed)
    }

    /// Bytes not yet taken
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Bytes over the counter's lifetime
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Sink-level statistics
#[derive(Debug, Clone)]
pub struct SinkStats {
    pub started_at: Instant,
    /// Packets handed to a sender
    pub video_packets: u64,
    pub audio_packets: u64,
    pub keyframes: u64,
    /// Frames rejected because a queue was full
    pub dropped_frames: u64,
    /// Sender replacements after send failures
    pub reconnects: u64,
    pub bytes_sent: u64,
}

impl SinkStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            video_packets: 0,
            audio_packets: 0,
            keyframes: 0,
            dropped_frames: 0,
            reconnects: 0,
            bytes_sent: 0,
        }
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average send rate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}

impl Default for SinkStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_clears() {
        let counter = ByteCounter::new();
        counter.add(100);
        counter.add(28);
        assert_eq!(counter.pending(), 128);
        assert_eq!(counter.take(), 128);
        assert_eq!(counter.take(), 0);
        counter.add(5);
        assert_eq!(counter.take(), 5);
        assert_eq!(counter.total(), 133);
    }

    #[test]
    fn test_concurrent_adds_reported_once() {
        let counter = Arc::new(ByteCounter::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.add(3);
                    }
                })
            })
            .collect();

        let mut seen = 0;
        for w in writers {
            seen += counter.take();
            w.join().unwrap();
        }
        seen += counter.take();
        assert_eq!(seen, 4 * 1000 * 3);
    }

    #[test]
    fn test_sink_stats_bitrate_zero_at_start() {
        let mut stats = SinkStats::new();
        stats.bytes_sent = 1_000_000;
        assert_eq!(stats.bitrate(), 0);
    }
}
