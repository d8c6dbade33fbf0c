//! Core data types for gstpl-rs
//!
//! - [`NativeBuffer`] - a buffer as handed over by an engine's streaming thread
//! - [`Sample`] - the immutable unit of data delivered to consumers by `recv`
//!
//! Timing fields are `Option`s: an engine may leave any of them unset.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Buffer produced by an engine, before it crosses into the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeBuffer {
    pub data: Vec<u8>,
    pub pts: Option<Duration>,
    pub dts: Option<Duration>,
    pub duration: Option<Duration>,
    pub offset: Option<u64>,
    pub offset_end: Option<u64>,
}

impl NativeBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_timestamps(mut self, pts: Option<Duration>, dts: Option<Duration>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_offsets(mut self, offset: Option<u64>, offset_end: Option<u64>) -> Self {
        self.offset = offset;
        self.offset_end = offset_end;
        self
    }
}

/// One unit of produced data plus its timing metadata.
///
/// Samples are immutable once built; the consumer owns them after `recv`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    data: Vec<u8>,
    pts: Option<Duration>,
    dts: Option<Duration>,
    duration: Option<Duration>,
    offset: Option<u64>,
    offset_end: Option<u64>,
}

impl Sample {
    /// Create a sample carrying only data, all timing unset
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// Payload bytes, passed through from the engine unmodified
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take ownership of the payload
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Presentation timestamp
    pub fn pts(&self) -> Option<Duration> {
        self.pts
    }

    /// Decoding timestamp
    pub fn dts(&self) -> Option<Duration> {
        self.dts
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn offset_end(&self) -> Option<u64> {
        self.offset_end
    }
}

impl From<NativeBuffer> for Sample {
    fn from(buffer: NativeBuffer) -> Self {
        let NativeBuffer {
            data,
            pts,
            dts,
            duration,
            offset,
            offset_end,
        } = buffer;
        Self {
            data,
            pts,
            dts,
            duration,
            offset,
            offset_end,
        }
    }
}
