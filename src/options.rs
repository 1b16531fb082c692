//! Per-object option maps
//!
//! Inputs, outputs and muxers carry loosely typed options that the control
//! surface may change at any time while worker threads read them. String and
//! integer values live in separate maps, each behind its own lock.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Well-known option keys
pub mod keys {
    pub const WIDTH: &str = "w";
    pub const HEIGHT: &str = "h";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";
    pub const HIDDEN: &str = "hidden";
    pub const MUTED: &str = "muted";
    pub const VIDEO_BITRATE: &str = "vb";
    pub const AUDIO_BITRATE: &str = "ab";
    pub const BACKGROUND: &str = "bg";
    pub const STRETCH_MODE: &str = "stretchMode";
    pub const SUPPORT_SEI: &str = "supportSEI";
}

/// How a picture is fitted into a target rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StretchMode {
    /// Cover the target, cropping overflow
    #[default]
    AspectFill,
    /// Fit inside the target, padding with the background
    AspectFit,
    /// Stretch to the target, ignoring aspect ratio
    ScaleToFit,
}

impl StretchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "aspectFill" => Some(StretchMode::AspectFill),
            "aspectFit" => Some(StretchMode::AspectFit),
            "scaleToFit" => Some(StretchMode::ScaleToFit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StretchMode::AspectFill => "aspectFill",
            StretchMode::AspectFit => "aspectFit",
            StretchMode::ScaleToFit => "scaleToFit",
        }
    }

    /// Integer form stored in an [`OptionMap`]
    pub fn to_int(self) -> i64 {
        match self {
            StretchMode::AspectFill => 0,
            StretchMode::AspectFit => 1,
            StretchMode::ScaleToFit => 2,
        }
    }

    pub fn from_int(v: i64) -> Self {
        match v {
            1 => StretchMode::AspectFit,
            2 => StretchMode::ScaleToFit,
            _ => StretchMode::AspectFill,
        }
    }
}

/// A value destined for one of the two maps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int(i64),
    Str(String),
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

#[derive(Debug, Default)]
pub struct OptionMap {
    strings: Mutex<HashMap<String, String>>,
    ints: Mutex<HashMap<String, i64>>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_str(&self, key: &str, value: impl Into<String>) {
        self.strings.lock().insert(key.to_string(), value.into());
    }

    pub fn set_int(&self, key: &str, value: i64) {
        self.ints.lock().insert(key.to_string(), value);
    }

    pub fn set_bool(&self, key: &str, value: bool) {
        self.set_int(key, value as i64);
    }

    pub fn set(&self, key: &str, value: OptionValue) {
        match value {
            OptionValue::Int(v) => self.set_int(key, v),
            OptionValue::Str(v) => self.set_str(key, v),
        }
    }

    /// Presence-only flag
    pub fn set_flag(&self, key: &str) {
        self.set_str(key, "");
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.strings.lock().get(key).cloned()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.lock().get(key).copied()
    }

    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Non-zero integer value; absent counts as false
    pub fn is_true(&self, key: &str) -> bool {
        self.get_int(key).map(|v| v != 0).unwrap_or(false)
    }

    /// True if `key` is present in either map
    pub fn has(&self, key: &str) -> bool {
        self.strings.lock().contains_key(key) || self.ints.lock().contains_key(key)
    }

    pub fn stretch_mode(&self) -> StretchMode {
        if let Some(v) = self.get_int(keys::STRETCH_MODE) {
            return StretchMode::from_int(v);
        }
        self.get_str(keys::STRETCH_MODE)
            .and_then(|s| StretchMode::parse(&s))
            .unwrap_or_default()
    }

    pub fn remove(&self, key: &str) {
        self.strings.lock().remove(key);
        self.ints.lock().remove(key);
    }

    pub fn clear(&self) {
        self.strings.lock().clear();
        self.ints.lock().clear();
    }
}
