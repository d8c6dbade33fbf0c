//! Process-wide run context shared by every pipeline.
//!
//! The context is a run loop thread that dispatches bus messages (end of
//! stream, errors) posted by engines. It is reference counted: the first
//! [`acquire`] brings it up, the last [`RunContextRef::release`] tears it
//! down. Only the 0↔1 transitions do real work, and both happen under one
//! mutex so concurrent construction and closing stay consistent.
//!
//! Pipelines are the only callers of `acquire`/`release`; consumers can
//! observe the count through [`ref_count`] but never change it.

use crate::error::{PipelineError, Result};
use crate::pipeline::bridge::BusMessage;
use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::thread::JoinHandle;

/// Default name of the run loop thread
pub const DEFAULT_RUN_LOOP_THREAD_NAME: &str = "gstpl-run-loop";

struct RunLoop {
    bus: Sender<BusMessage>,
    thread: JoinHandle<()>,
}

struct ContextState {
    refs: usize,
    run_loop: Option<RunLoop>,
    thread_name: String,
}

impl ContextState {
    fn new() -> Self {
        Self {
            refs: 0,
            run_loop: None,
            thread_name: DEFAULT_RUN_LOOP_THREAD_NAME.to_string(),
        }
    }
}

static RUN_CONTEXT: Lazy<Mutex<ContextState>> = Lazy::new(|| Mutex::new(ContextState::new()));

/// One counted reference to the shared run context.
///
/// Dropping the reference releases it.
#[derive(Debug)]
pub struct RunContextRef {
    bus: Sender<BusMessage>,
}

impl RunContextRef {
    /// Sender side of the run loop's bus
    pub(crate) fn bus(&self) -> Sender<BusMessage> {
        self.bus.clone()
    }

    /// Give the reference back. Tears the run loop down if it was the last one.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RunContextRef {
    fn drop(&mut self) {
        release_one();
    }
}

/// Take a reference on the shared run context, starting it if needed.
///
/// Fails only if the run loop thread cannot be spawned.
pub(crate) fn acquire() -> Result<RunContextRef> {
    let mut state = RUN_CONTEXT.lock();

    let bus = match state.run_loop.as_ref() {
        Some(run_loop) => run_loop.bus.clone(),
        None => {
            let (bus, inbox) = unbounded();
            let thread = std::thread::Builder::new()
                .name(state.thread_name.clone())
                .spawn(move || run(inbox))
                .map_err(|e| {
                    PipelineError::RunContext(format!("failed to start run loop: {}", e))
                })?;
            tracing::info!(thread = %state.thread_name, "run context started");
            state.run_loop = Some(RunLoop {
                bus: bus.clone(),
                thread,
            });
            bus
        }
    };

    state.refs += 1;
    tracing::trace!(refs = state.refs, "run context acquired");
    Ok(RunContextRef { bus })
}

fn release_one() {
    let mut state = RUN_CONTEXT.lock();

    state.refs = state.refs.saturating_sub(1);
    tracing::trace!(refs = state.refs, "run context released");
    if state.refs > 0 {
        return;
    }

    let Some(run_loop) = state.run_loop.take() else {
        return;
    };
    let _ = run_loop.bus.send(BusMessage::Quit);

    // Joining ourselves would deadlock.
    if run_loop.thread.thread().id() == std::thread::current().id() {
        tracing::warn!("run context released from its own thread, detaching");
        return;
    }
    if run_loop.thread.join().is_err() {
        tracing::error!("run loop thread panicked");
    }
    tracing::info!("run context stopped");
}

/// Number of live references on the shared run context.
pub fn ref_count() -> usize {
    RUN_CONTEXT.lock().refs
}

/// Set the run loop thread name. Applies the next time the context starts.
pub fn set_thread_name(name: impl Into<String>) {
    RUN_CONTEXT.lock().thread_name = name.into();
}

fn run(inbox: Receiver<BusMessage>) {
    for msg in inbox.iter() {
        if matches!(msg, BusMessage::Quit) {
            break;
        }
        msg.dispatch();
    }
}
