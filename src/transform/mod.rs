//! Frame format conversion
//!
//! - [`AudioResampler`]: any PCM to canonical S16 stereo 48 kHz, fixed frame size
//! - [`VideoRescaler`]: aspect-aware scaling onto a fixed-size canvas
//! - [`overlay`]: clipped, optionally alpha-blended picture drawing

pub mod overlay;
pub mod pixel;
pub mod resampler;
pub mod rescaler;

pub use overlay::overlay;
pub use pixel::rgb_to_yuv;
pub use resampler::AudioResampler;
pub use rescaler::{zoom_rect, VideoRescaler, ZoomRect};
