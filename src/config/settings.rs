//! Settings for the built-in reference engine
//!
//! These are defaults applied when a description leaves a property unset.
//! They never change the layer-owned sink stage.

use serde::{Deserialize, Serialize};

/// Default frame width for `videotestsrc`
pub const DEFAULT_WIDTH: u32 = 320;

/// Default frame height for `videotestsrc`
pub const DEFAULT_HEIGHT: u32 = 240;

/// Default frame rate for `videotestsrc`
pub const DEFAULT_FRAMERATE: &str = "30/1";

/// Default read size for `filesrc`
pub const DEFAULT_BLOCKSIZE: usize = 4096;

/// Default upper size bound for `fakesrc`
pub const DEFAULT_FAKE_SIZEMAX: usize = 4096;

/// Defaults used by [`SimEngine`](crate::engine::SimEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Bytes per buffer read by `filesrc`
    pub default_blocksize: usize,

    /// `videotestsrc` frame width in pixels
    pub default_width: u32,

    /// `videotestsrc` frame height in pixels
    pub default_height: u32,

    /// `videotestsrc` frame rate as `numerator/denominator`
    pub default_framerate: String,

    /// `fakesrc` maximum buffer size
    pub default_sizemax: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            default_blocksize: DEFAULT_BLOCKSIZE,
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            default_framerate: DEFAULT_FRAMERATE.to_string(),
            default_sizemax: DEFAULT_FAKE_SIZEMAX,
        }
    }
}
