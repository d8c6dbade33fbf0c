//! # gstpl-rs: pull-based media pipelines
//!
//! Bridges a callback-driven media engine, which builds a graph from a
//! textual description and pushes buffers, end of stream and errors from
//! its own threads, to a synchronous pull API.
//!
//! ## Architecture
//!
//! - **Pipeline**: per-instance state machine with `start`, `recv` and `close`
//! - **Bridge**: engine-facing callbacks writing into per-instance channels
//! - **Context**: process-wide, reference-counted run loop dispatching bus messages
//! - **Engine**: the `Engine`/`Graph` seam plus the built-in reference engine
//! - **Communication**: crossbeam channels; a zero-capacity hand-off per
//!   instance gives backpressure without buffering
//!
//! ## Example
//!
//! ```ignore
//! use gstpl_rs::Pipeline;
//!
//! let pipeline = Pipeline::new("videotestsrc num-buffers=5")?;
//! pipeline.start()?;
//! loop {
//!     match pipeline.recv() {
//!         Ok(sample) => println!("{} bytes at {:?}", sample.len(), sample.pts()),
//!         Err(e) if e.is_end_of_stream() => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! pipeline.close()?;
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::{BridgeConfig, SimConfig};
pub use engine::{Engine, Graph, SimEngine};
pub use error::{EngineError, ErrorDomain, NativeError, PipelineError, Result, ResultExt};
pub use pipeline::bridge::{CancelToken, FlowReturn, SinkHandle};
pub use pipeline::{Pipeline, Samples, SINK_NAME, SINK_STAGE};
pub use types::{NativeBuffer, Sample};
