//! Pull-based pipeline instances.
//!
//! A [`Pipeline`] wraps one engine graph and turns its pushed callbacks into
//! a blocking [`Pipeline::recv`]. Lifecycle:
//!
//! ```text
//! Created ──start──▶ Started ──EOS / error──▶ Terminal
//!    │                  │                        ▲
//!    └──────close───────┴────────close───────────┘
//! ```
//!
//! - `start` is idempotent and fails with [`PipelineError::Closed`] after `close`.
//! - `recv` blocks until a sample, end of stream, an engine error, or `close`.
//!   Terminal results are sticky and returned without blocking. An unread
//!   engine error takes precedence over a later end of stream.
//! - `close` is idempotent, may run on any thread, and wakes a blocked `recv`.
//!
//! # Example
//!
//! ```ignore
//! use gstpl_rs::Pipeline;
//!
//! let pipeline = Pipeline::new("fakesrc num-buffers=5 sizetype=fixed sizemax=42")?;
//! pipeline.start()?;
//! for sample in pipeline.iter() {
//!     println!("{} bytes", sample?.len());
//! }
//! pipeline.close()?;
//! ```

pub mod bridge;

use crate::context::{self, RunContextRef};
use crate::engine::{self, Engine, Graph};
use crate::error::{EngineError, PipelineError, Result};
use crate::types::Sample;
use bridge::{Delivery, InstanceChannels, SinkHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Name of the layer-owned sink stage
pub const SINK_NAME: &str = "gstpl-sink";

/// Sink stage appended to every description
pub const SINK_STAGE: &str = "appsink name=gstpl-sink";

/// Terminal condition remembered after it was first observed.
#[derive(Debug, Clone)]
enum Terminal {
    EndOfStream,
    Failed(EngineError),
}

impl Terminal {
    fn to_error(&self) -> PipelineError {
        match self {
            Terminal::EndOfStream => PipelineError::EndOfStream,
            Terminal::Failed(err) => PipelineError::Runtime(err.clone()),
        }
    }
}

/// One engine graph exposed as a pull-based sample source.
///
/// `Pipeline` is `Send + Sync`: `close` may be called from another thread
/// while `recv` is blocked. Concurrent `recv` calls are not supported.
pub struct Pipeline {
    description: String,
    channels: Arc<InstanceChannels>,
    graph: Mutex<Option<Box<dyn Graph>>>,
    context: Mutex<Option<RunContextRef>>,
    terminal: Mutex<Option<Terminal>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl Pipeline {
    /// Build a pipeline on the default engine.
    pub fn new(description: &str) -> Result<Self> {
        Self::with_engine(description, engine::default_engine())
    }

    /// Build a pipeline on `engine`.
    ///
    /// The layer's sink stage is appended to `description`. On failure the
    /// engine's message and code are returned unchanged as
    /// [`PipelineError::Build`], and nothing stays acquired.
    pub fn with_engine(description: &str, engine: Arc<dyn Engine>) -> Result<Self> {
        let context = context::acquire()?;
        let channels = Arc::new(InstanceChannels::new());
        let sink = SinkHandle::new(SINK_NAME, &channels, context.bus());

        let full = format!("{} ! {}", description, SINK_STAGE);
        let graph = match engine.launch(&full, sink) {
            Ok(graph) => graph,
            Err(native) => {
                let err = EngineError::from_native(native);
                tracing::debug!(description, code = err.code, "build failed: {}", err.message);
                context.release();
                return Err(PipelineError::Build(err));
            }
        };

        tracing::debug!(instance = channels.id(), description, "pipeline created");
        Ok(Self {
            description: description.to_string(),
            channels,
            graph: Mutex::new(Some(graph)),
            context: Mutex::new(Some(context)),
            terminal: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Instance identifier, as used in log fields
    pub fn id(&self) -> u64 {
        self.channels.id()
    }

    /// The description as given by the caller, without the sink stage
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Ask the engine to begin producing. Idempotent; never waits for data.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.graph.lock();
        let graph = match slot.as_mut() {
            Some(graph) if !self.is_closed() => graph,
            _ => return Err(PipelineError::Closed),
        };
        if self.is_started() {
            return Ok(());
        }
        if let Some(terminal) = self.terminal.lock().as_ref() {
            return Err(terminal.to_error());
        }

        if let Err(native) = graph.play() {
            let err = EngineError::from_native(native);
            tracing::warn!(instance = self.id(), "failed to start: {}", err.message);
            return Err(self.finish(Terminal::Failed(err)));
        }

        self.started.store(true, Ordering::Release);
        tracing::debug!(instance = self.id(), "pipeline started");
        Ok(())
    }

    /// Block until the next sample or a terminal result.
    ///
    /// Returns [`PipelineError::EndOfStream`] after end of stream or `close`,
    /// and [`PipelineError::Runtime`] after an engine error. Both repeat on
    /// every later call.
    pub fn recv(&self) -> Result<Sample> {
        if let Some(terminal) = self.terminal.lock().as_ref() {
            return Err(terminal.to_error());
        }
        if self.channels.is_cancelled() {
            return Err(self.end_of_stream());
        }

        match self.channels.wait() {
            Delivery::Sample(sample) => Ok(sample),
            Delivery::EndOfStream => Err(self.end_of_stream()),
            Delivery::Error(err) => Err(self.finish(Terminal::Failed(err))),
        }
    }

    /// End of stream, unless an engine error is still unreported. After
    /// `close` it is always end of stream.
    fn end_of_stream(&self) -> PipelineError {
        let pending = if self.is_closed() {
            None
        } else {
            self.channels.pending_error()
        };
        match pending {
            Some(err) => self.finish(Terminal::Failed(err)),
            None => self.finish(Terminal::EndOfStream),
        }
    }

    /// Release the graph and the shared context. Idempotent, callable from any thread.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Cancel first so a streaming thread blocked in a hand-off lets go
        // before the graph joins it.
        self.channels.cancel();

        let graph = self.graph.lock().take();
        if let Some(mut graph) = graph {
            graph.shutdown();
        }

        if let Some(context) = self.context.lock().take() {
            context.release();
        }

        tracing::debug!(instance = self.id(), "pipeline closed");
        Ok(())
    }

    /// Iterate samples until end of stream or close. A runtime error is
    /// yielded once, then the iterator ends.
    pub fn iter(&self) -> Samples<'_> {
        Samples {
            pipeline: self,
            done: false,
        }
    }

    /// Record the first terminal condition and return its error.
    fn finish(&self, terminal: Terminal) -> PipelineError {
        let mut slot = self.terminal.lock();
        slot.get_or_insert(terminal).to_error()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id())
            .field("description", &self.description)
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Iterator returned by [`Pipeline::iter`]
pub struct Samples<'a> {
    pipeline: &'a Pipeline,
    done: bool,
}

impl Iterator for Samples<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pipeline.recv() {
            Ok(sample) => Some(Ok(sample)),
            Err(err) if err.is_end_of_stream() => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = Result<Sample>;
    type IntoIter = Samples<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
