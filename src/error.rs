//! Error handling for gstpl-rs
//!
//! This module defines the error taxonomy of the bridge and the adapter that
//! turns engine-native error records into it.
//!
//! # Taxonomy
//!
//! - **Construction**: [`PipelineError::Build`], returned synchronously by the constructor
//! - **Runtime**: [`PipelineError::Runtime`], delivered through `recv` and terminal
//! - **Closed use**: [`PipelineError::Closed`] from `start` after `close`
//! - **End of stream**: [`PipelineError::EndOfStream`], a normal terminal signal
//!
//! Native records ([`NativeError`]) never leave the bridge: they are translated
//! at the boundary by [`EngineError::from_native`].

use std::fmt;
use thiserror::Error;

/// Error domain of an engine-native error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// Core engine failures
    Core,
    /// Failures inside a processing library
    Library,
    /// Failures accessing an external resource (files, devices)
    Resource,
    /// Failures in the data stream itself
    Stream,
    /// Failures parsing a graph description
    Parse,
}

impl ErrorDomain {
    /// Short lowercase name of the domain
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorDomain::Core => "core",
            ErrorDomain::Library => "library",
            ErrorDomain::Resource => "resource",
            ErrorDomain::Stream => "stream",
            ErrorDomain::Parse => "parse",
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error record as produced by an engine.
///
/// The bridge consumes these by value; they are never handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub domain: ErrorDomain,
    pub code: i32,
    pub message: String,
    /// Extra engine-internal detail. Dropped during translation.
    pub debug: Option<String>,
}

impl NativeError {
    pub fn new(domain: ErrorDomain, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }
}

/// Translated engine error: a message plus the numeric code, unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code})")]
pub struct EngineError {
    pub domain: ErrorDomain,
    pub code: i32,
    pub message: String,
}

impl EngineError {
    /// Translate a native error record, releasing everything the bridge does not keep.
    pub fn from_native(native: NativeError) -> Self {
        let NativeError {
            domain,
            code,
            message,
            debug,
        } = native;
        if let Some(detail) = debug {
            tracing::trace!(%domain, code, detail = %detail, "dropping native debug detail");
        }
        Self {
            domain,
            code,
            message,
        }
    }
}

impl From<NativeError> for EngineError {
    fn from(native: NativeError) -> Self {
        EngineError::from_native(native)
    }
}

/// Main error type for gstpl-rs operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The pipeline was closed before the call
    #[error("pipeline is closed")]
    Closed,

    /// No more samples will be produced
    #[error("end of stream")]
    EndOfStream,

    /// The engine refused to build the graph
    #[error("failed to build pipeline: {0}")]
    Build(EngineError),

    /// The engine reported a fault while running
    #[error("pipeline error: {0}")]
    Runtime(EngineError),

    /// The shared run context could not be brought up
    #[error("run context error: {0}")]
    RunContext(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with any context layers removed
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.root(), PipelineError::EndOfStream)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.root(), PipelineError::Closed)
    }

    /// True for results after which `recv` will never yield another sample.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::EndOfStream | PipelineError::Closed | PipelineError::Runtime(_)
        )
    }

    /// The translated engine error, for build and runtime failures
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self.root() {
            PipelineError::Build(e) | PipelineError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for gstpl-rs operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
