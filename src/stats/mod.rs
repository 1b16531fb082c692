//! Statistics for sinks and senders

pub mod counter;

pub use counter::{ByteCounter, SinkStats};
