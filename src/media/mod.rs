//! Bitstream and container helpers
//!
//! - [`flv`]: FLV tags, file writer and reader
//! - [`h264`]: Annex-B splitting, AVC configuration records
//! - [`aac`]: ADTS headers, AudioSpecificConfig

pub mod aac;
pub mod flv;
pub mod h264;

pub use aac::{AdtsHeader, AudioSpecificConfig};
pub use flv::{FlvReader, FlvTag, FlvTagType, FlvWriter, SoundFormat};
pub use h264::{AvcConfig, NaluType};
