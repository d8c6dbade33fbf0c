//! Engine seam
//!
//! The engine is a black box that builds a processing graph from a textual
//! description and runs it on its own threads. This module defines the two
//! traits the bridge drives it through, plus the error codes engines report.
//!
//! # Contract
//!
//! - [`Engine::launch`] parses the description, finds the sink stage named
//!   [`SinkHandle::name`] and attaches the handle to it. Failures are
//!   returned synchronously as a [`NativeError`].
//! - [`Graph::play`] starts production without waiting for data.
//! - Streaming threads call [`SinkHandle::push_sample`] for every buffer and
//!   stop as soon as it returns
//!   [`FlowReturn::Flushing`](crate::pipeline::bridge::FlowReturn::Flushing).
//! - End of stream and runtime faults are posted on the bus
//!   ([`SinkHandle::post_end_of_stream`], [`SinkHandle::post_error`]).
//! - [`Graph::shutdown`] stops and joins every engine thread. The bridge
//!   cancels the instance first, so pending pushes are already unblocked.
//!
//! # Components
//!
//! - [`SimEngine`] - in-process reference engine (`fakesrc`, `videotestsrc`, `filesrc`, ...)
//! - [`parse`] - tokenizer for `factory prop=value ! ...` descriptions

pub mod parse;
pub mod sim;

use crate::error::NativeError;
use crate::pipeline::bridge::SinkHandle;
use std::sync::Arc;

pub use sim::SimEngine;

/// Error codes reported by engines, grouped by [`ErrorDomain`](crate::error::ErrorDomain).
pub mod codes {
    // Parse domain
    pub const PARSE_SYNTAX: i32 = 0;
    pub const PARSE_NO_SUCH_ELEMENT: i32 = 1;
    pub const PARSE_NO_SUCH_PROPERTY: i32 = 2;
    pub const PARSE_LINK: i32 = 3;
    pub const PARSE_COULD_NOT_SET_PROPERTY: i32 = 4;
    pub const PARSE_EMPTY: i32 = 6;

    // Core domain
    pub const CORE_FAILED: i32 = 1;
    pub const CORE_STATE_CHANGE: i32 = 4;

    // Resource domain
    pub const RESOURCE_NOT_FOUND: i32 = 3;
    pub const RESOURCE_OPEN_READ: i32 = 5;
    pub const RESOURCE_READ: i32 = 9;
}

/// A graph-building, graph-running engine.
#[cfg_attr(test, mockall::automock)]
pub trait Engine: Send + Sync {
    /// Build a graph from `description` and attach `sink` to its sink stage.
    fn launch(&self, description: &str, sink: SinkHandle) -> Result<Box<dyn Graph>, NativeError>;
}

/// A built graph, exclusively owned by one pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait Graph: Send {
    /// Begin pushing data. Must not block waiting for data.
    fn play(&mut self) -> Result<(), NativeError>;

    /// Stop all engine activity for this graph and release it.
    fn shutdown(&mut self);
}

/// Engine used by [`Pipeline::new`](crate::Pipeline::new)
pub fn default_engine() -> Arc<dyn Engine> {
    Arc::new(SimEngine::new())
}
