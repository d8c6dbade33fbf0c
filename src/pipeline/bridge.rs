//! Thread boundary between the engine's threads and the consumer.
//!
//! Every pipeline owns one [`InstanceChannels`]: a zero-capacity sample
//! channel, a single-slot error store with a one-deep wake-up signal, and a
//! [`CancelToken`]. The engine never sees these directly. It receives a
//! [`SinkHandle`], a non-owning back-reference that it calls from its
//! streaming thread (`push_sample`) or posts to the shared run loop through
//! (`post_end_of_stream`, `post_error`).
//!
//! The handle tolerates the instance being torn down underneath it: a dead
//! or cancelled instance turns every callback into a no-op that reports
//! [`FlowReturn::Flushing`].

use crate::error::{EngineError, NativeError};
use crate::types::{NativeBuffer, Sample};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Result of handing a buffer to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowReturn {
    /// The consumer took the sample
    Ok,
    /// The instance is cancelled or gone; the producer should stop
    Flushing,
}

/// One-shot, irreversible cancellation signal.
///
/// Cancelling drops the only sender of an internal channel, so [`CancelToken::done`]
/// becomes permanently ready and can sit in a `select!` next to other channels.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, done) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                done,
            }),
        }
    }

    /// Signal cancellation. Returns `true` only for the call that actually signalled.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        drop(self.inner.trigger.lock().take());
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Channel that becomes ready (disconnected) once cancelled. Never yields a value.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// What a blocked consumer woke up to.
#[derive(Debug)]
pub(crate) enum Delivery {
    Sample(Sample),
    EndOfStream,
    Error(EngineError),
}

/// Per-instance channels and state shared between the engine callbacks and the consumer.
#[derive(Debug)]
pub(crate) struct InstanceChannels {
    id: u64,
    cancel: CancelToken,
    sample_tx: Sender<Sample>,
    sample_rx: Receiver<Sample>,
    /// Last reported error. Later errors overwrite earlier unconsumed ones.
    error_slot: Mutex<Option<EngineError>>,
    error_tx: Sender<()>,
    error_rx: Receiver<()>,
}

impl InstanceChannels {
    pub(crate) fn new() -> Self {
        let (sample_tx, sample_rx) = bounded(0);
        let (error_tx, error_rx) = bounded(1);
        Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            cancel: CancelToken::new(),
            sample_tx,
            sample_rx,
            error_slot: Mutex::new(None),
            error_tx,
            error_rx,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ── Engine side ──

    /// Hand one buffer to the consumer, blocking until it is taken or the instance is cancelled.
    pub(crate) fn on_sample(&self, buffer: NativeBuffer) -> FlowReturn {
        if self.cancel.is_cancelled() {
            return FlowReturn::Flushing;
        }

        let sample = Sample::from(buffer);
        let size = sample.len();
        select! {
            send(self.sample_tx, sample) -> res => match res {
                Ok(()) => {
                    tracing::trace!(instance = self.id, size, "sample handed off");
                    FlowReturn::Ok
                }
                Err(_) => FlowReturn::Flushing,
            },
            recv(self.cancel.done()) -> _ => {
                tracing::trace!(instance = self.id, size, "sample hand-off abandoned");
                FlowReturn::Flushing
            }
        }
    }

    pub(crate) fn on_end_of_stream(&self) {
        if self.cancel.cancel() {
            tracing::debug!(instance = self.id, "end of stream");
        }
    }

    pub(crate) fn on_error(&self, native: NativeError) {
        if self.cancel.is_cancelled() {
            tracing::debug!(
                instance = self.id,
                message = %native.message,
                "ignoring engine error on cancelled instance"
            );
            return;
        }

        let err = EngineError::from_native(native);
        tracing::warn!(
            instance = self.id,
            domain = %err.domain,
            code = err.code,
            "engine error: {}",
            err.message
        );
        *self.error_slot.lock() = Some(err);

        // One pending wake-up is enough, the consumer re-reads the slot.
        let _ = self.error_tx.try_send(());
    }

    // ── Consumer side ──

    /// Block until a sample, end of stream (or cancellation), or an error is observed.
    pub(crate) fn wait(&self) -> Delivery {
        select! {
            recv(self.sample_rx) -> sample => match sample {
                Ok(sample) => Delivery::Sample(sample),
                Err(_) => Delivery::EndOfStream,
            },
            recv(self.cancel.done()) -> _ => Delivery::EndOfStream,
            recv(self.error_rx) -> _ => Delivery::Error(self.stored_error()),
        }
    }

    /// The stored error, if its wake-up has not been consumed yet.
    pub(crate) fn pending_error(&self) -> Option<EngineError> {
        self.error_rx.try_recv().ok().map(|()| self.stored_error())
    }

    fn stored_error(&self) -> EngineError {
        self.error_slot.lock().clone().unwrap_or_else(|| EngineError {
            domain: crate::error::ErrorDomain::Core,
            code: crate::engine::codes::CORE_FAILED,
            message: "internal data stream error".to_string(),
        })
    }
}

/// Message posted by an engine to the shared run loop.
#[derive(Debug)]
pub(crate) enum BusMessage {
    EndOfStream(Weak<InstanceChannels>),
    Error(Weak<InstanceChannels>, NativeError),
    Quit,
}

impl BusMessage {
    /// Deliver the message to its instance, if it is still alive.
    pub(crate) fn dispatch(self) {
        match self {
            BusMessage::EndOfStream(target) => {
                if let Some(target) = target.upgrade() {
                    target.on_end_of_stream();
                }
            }
            BusMessage::Error(target, native) => match target.upgrade() {
                Some(target) => target.on_error(native),
                None => tracing::debug!(
                    message = %native.message,
                    "dropping error for released instance"
                ),
            },
            BusMessage::Quit => {}
        }
    }
}

/// Back-reference to a pipeline instance, handed to the engine at build time.
///
/// Holds no ownership: once the pipeline is gone every call is a cheap no-op.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    name: &'static str,
    instance: u64,
    target: Weak<InstanceChannels>,
    bus: Sender<BusMessage>,
}

impl SinkHandle {
    pub(crate) fn new(
        name: &'static str,
        target: &Arc<InstanceChannels>,
        bus: Sender<BusMessage>,
    ) -> Self {
        Self {
            name,
            instance: target.id(),
            target: Arc::downgrade(target),
            bus,
        }
    }

    /// Name of the layer-owned sink stage this handle must be attached to
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Identifier of the owning pipeline instance, for logging and thread names
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    /// True once the instance is cancelled or released
    pub fn is_flushing(&self) -> bool {
        self.target
            .upgrade()
            .map_or(true, |target| target.is_cancelled())
    }

    /// Push one buffer from a streaming thread. Blocks until the consumer takes it.
    pub fn push_sample(&self, buffer: NativeBuffer) -> FlowReturn {
        match self.target.upgrade() {
            Some(target) => target.on_sample(buffer),
            None => FlowReturn::Flushing,
        }
    }

    /// Post end-of-stream to the run loop. Never blocks.
    pub fn post_end_of_stream(&self) {
        self.post(BusMessage::EndOfStream(self.target.clone()));
    }

    /// Post a runtime error to the run loop. Never blocks.
    pub fn post_error(&self, error: NativeError) {
        self.post(BusMessage::Error(self.target.clone(), error));
    }

    fn post(&self, msg: BusMessage) {
        if self.bus.send(msg).is_err() {
            tracing::trace!(instance = self.instance, "run loop gone, dropping bus message");
        }
    }
}
