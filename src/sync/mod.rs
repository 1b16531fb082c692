//! Thread synchronization primitives shared by the media pipeline

pub mod cancel;
pub mod clock;
pub mod queue;

pub use cancel::CancelToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use queue::SharedQueue;
