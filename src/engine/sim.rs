//! Reference engine
//!
//! An in-process engine that understands a handful of element factories and
//! runs every graph on one streaming thread, the way a real engine drives a
//! linear chain. It exists so the bridge can be used and tested without an
//! external media framework.
//!
//! # Elements
//!
//! | Factory        | Role   | Properties |
//! |----------------|--------|------------|
//! | `fakesrc`      | source | `num-buffers`, `sizetype`, `sizemin`, `sizemax`, `filltype` |
//! | `videotestsrc` | source | `num-buffers`, `width`, `height`, `framerate`, `is-live` |
//! | `filesrc`      | source | `location`, `blocksize`, `num-buffers` |
//! | `identity`     | filter | `silent`, `sleep-time` (µs per buffer), `error-after` |
//! | `queue`        | filter | `max-size-buffers` (accepted, no buffering) |
//! | `appsink`      | sink   | `sync`, `emit-signals` |
//!
//! Every element also accepts `name`. Buffer sizes above [`MAX_BUFFER_SIZE`]
//! are refused at build time.
//!
//! # Example
//!
//! ```ignore
//! use gstpl_rs::{engine::SimEngine, Pipeline};
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::with_engine("fakesrc num-buffers=5", Arc::new(SimEngine::new()))?;
//! ```

use super::parse::{parse_description, ElementSpec};
use super::{codes, Engine, Graph};
use crate::config::SimConfig;
use crate::error::{ErrorDomain, NativeError};
use crate::pipeline::bridge::{FlowReturn, SinkHandle};
use crate::types::NativeBuffer;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::str::FromStr;
use std::thread::JoinHandle;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Largest buffer any source may be configured to produce
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

// ==================== Element settings ====================

/// How `fakesrc` sizes its buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeType {
    Empty,
    Fixed,
    Random,
}

impl FromStr for SizeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(SizeType::Empty),
            "fixed" => Ok(SizeType::Fixed),
            "random" => Ok(SizeType::Random),
            _ => Err(()),
        }
    }
}

/// How `fakesrc` fills its buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillType {
    Nothing,
    Zero,
    Pattern,
    Random,
}

impl FromStr for FillType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nothing" => Ok(FillType::Nothing),
            "zero" => Ok(FillType::Zero),
            "pattern" => Ok(FillType::Pattern),
            "random" => Ok(FillType::Random),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
struct FakeSrcSettings {
    num_buffers: Option<u64>,
    sizetype: SizeType,
    sizemin: usize,
    sizemax: usize,
    filltype: FillType,
}

#[derive(Debug, Clone)]
struct VideoTestSrcSettings {
    num_buffers: Option<u64>,
    width: u32,
    height: u32,
    framerate: (u64, u64),
    is_live: bool,
}

#[derive(Debug, Clone)]
struct FileSrcSettings {
    location: Option<PathBuf>,
    blocksize: usize,
    num_buffers: Option<u64>,
}

/// Accumulated effect of the filters between source and sink
#[derive(Debug, Clone, Default)]
struct FilterEffects {
    sleep: Duration,
    error_after: Option<u64>,
}

// ==================== Property helpers ====================

fn no_such_property(element: &ElementSpec, key: &str) -> NativeError {
    NativeError::new(
        ErrorDomain::Parse,
        codes::PARSE_NO_SUCH_PROPERTY,
        format!("no property \"{}\" in element \"{}\"", key, element.factory),
    )
}

fn could_not_set(element: &ElementSpec, key: &str, value: &str) -> NativeError {
    NativeError::new(
        ErrorDomain::Parse,
        codes::PARSE_COULD_NOT_SET_PROPERTY,
        format!(
            "could not set property \"{}\" in element \"{}\" to \"{}\"",
            key, element.factory, value
        ),
    )
}

fn link_error(message: impl Into<String>) -> NativeError {
    NativeError::new(ErrorDomain::Parse, codes::PARSE_LINK, message)
}

fn check_properties(element: &ElementSpec, allowed: &[&str]) -> Result<(), NativeError> {
    for (key, _) in &element.properties {
        if key != "name" && !allowed.contains(&key.as_str()) {
            return Err(no_such_property(element, key));
        }
    }
    Ok(())
}

fn prop<T: FromStr>(element: &ElementSpec, key: &str) -> Result<Option<T>, NativeError> {
    match element.property(key) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| could_not_set(element, key, value)),
    }
}

fn prop_bool(element: &ElementSpec, key: &str) -> Result<Option<bool>, NativeError> {
    match element.property(key) {
        None => Ok(None),
        Some("true") | Some("1") | Some("yes") => Ok(Some(true)),
        Some("false") | Some("0") | Some("no") => Ok(Some(false)),
        Some(value) => Err(could_not_set(element, key, value)),
    }
}

/// `num-buffers`: -1 means unbounded
fn prop_num_buffers(element: &ElementSpec) -> Result<Option<u64>, NativeError> {
    match prop::<i64>(element, "num-buffers")? {
        None | Some(-1) => Ok(None),
        Some(n) if n >= 0 => Ok(Some(n as u64)),
        Some(n) => Err(could_not_set(element, "num-buffers", &n.to_string())),
    }
}

fn parse_fraction(value: &str) -> Option<(u64, u64)> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num.trim().parse().ok()?, den.trim().parse().ok()?),
        None => (value.trim().parse().ok()?, 1),
    };
    (num > 0 && den > 0).then_some((num, den))
}

// ==================== Sources ====================

enum Produce {
    Buffer(NativeBuffer),
    EndOfStream,
    Error(NativeError),
}

trait BufferSource: Send {
    fn produce(&mut self) -> Produce;

    /// Interval to wait between buffers, for live sources
    fn pacing(&self) -> Option<Duration> {
        None
    }
}

/// Xorshift generator, deterministic per instance
#[derive(Debug, Clone)]
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed ^ 0x9E37_79B9_7F4A_7C15 | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        s
    }
}

struct FakeSrc {
    settings: FakeSrcSettings,
    produced: u64,
    offset: u64,
    rng: XorShift,
}

impl BufferSource for FakeSrc {
    fn produce(&mut self) -> Produce {
        if self.settings.num_buffers.is_some_and(|n| self.produced >= n) {
            return Produce::EndOfStream;
        }

        let size = match self.settings.sizetype {
            SizeType::Empty => 0,
            SizeType::Fixed => self.settings.sizemax,
            SizeType::Random => {
                let span = (self.settings.sizemax - self.settings.sizemin) as u64 + 1;
                self.settings.sizemin + (self.rng.next_u64() % span) as usize
            }
        };

        let data = match self.settings.filltype {
            FillType::Nothing | FillType::Zero => vec![0u8; size],
            FillType::Pattern => (0..size).map(|i| i as u8).collect(),
            FillType::Random => (0..size).map(|_| self.rng.next_u64() as u8).collect(),
        };

        let offset = self.offset;
        self.offset += size as u64;
        self.produced += 1;
        Produce::Buffer(NativeBuffer::new(data).with_offsets(Some(offset), Some(self.offset)))
    }
}

struct VideoTestSrc {
    settings: VideoTestSrcSettings,
    frame: u64,
}

impl VideoTestSrc {
    fn running_time(&self, frame: u64) -> Duration {
        let (num, den) = self.settings.framerate;
        let nanos = frame as u128 * NANOS_PER_SEC * den as u128 / num as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    fn frame_size(&self) -> usize {
        self.settings.width as usize * self.settings.height as usize * 4
    }
}

impl BufferSource for VideoTestSrc {
    fn produce(&mut self) -> Produce {
        if self.settings.num_buffers.is_some_and(|n| self.frame >= n) {
            return Produce::EndOfStream;
        }

        let frame = self.frame;
        let pts = self.running_time(frame);
        let next = self.running_time(frame + 1);
        let data = vec![(frame % 256) as u8; self.frame_size()];
        self.frame += 1;

        Produce::Buffer(
            NativeBuffer::new(data)
                .with_timestamps(Some(pts), None)
                .with_duration(Some(next - pts))
                .with_offsets(Some(frame), Some(frame + 1)),
        )
    }

    fn pacing(&self) -> Option<Duration> {
        self.settings
            .is_live
            .then(|| self.running_time(1))
    }
}

struct FileSrc {
    settings: FileSrcSettings,
    file: Option<File>,
    offset: u64,
    produced: u64,
}

impl FileSrc {
    fn open(&mut self) -> Result<&mut File, NativeError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let Some(location) = self.settings.location.as_ref() else {
                    return Err(NativeError::new(
                        ErrorDomain::Resource,
                        codes::RESOURCE_NOT_FOUND,
                        "No file name specified for reading.",
                    ));
                };
                File::open(location).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => NativeError::new(
                        ErrorDomain::Resource,
                        codes::RESOURCE_NOT_FOUND,
                        "Resource not found.",
                    )
                    .with_debug(format!("No such file \"{}\"", location.display())),
                    _ => NativeError::new(
                        ErrorDomain::Resource,
                        codes::RESOURCE_OPEN_READ,
                        format!("Could not open file \"{}\" for reading.", location.display()),
                    )
                    .with_debug(e.to_string()),
                })?
            }
        };
        Ok(self.file.insert(file))
    }
}

impl BufferSource for FileSrc {
    fn produce(&mut self) -> Produce {
        if self.settings.num_buffers.is_some_and(|n| self.produced >= n) {
            return Produce::EndOfStream;
        }

        let blocksize = self.settings.blocksize;
        let file = match self.open() {
            Ok(file) => file,
            Err(e) => return Produce::Error(e),
        };

        let mut data = vec![0u8; blocksize];
        let read = match file.read(&mut data) {
            Ok(0) => return Produce::EndOfStream,
            Ok(n) => n,
            Err(e) => {
                return Produce::Error(
                    NativeError::new(ErrorDomain::Resource, codes::RESOURCE_READ, "Could not read.")
                        .with_debug(e.to_string()),
                )
            }
        };
        data.truncate(read);

        let offset = self.offset;
        self.offset += read as u64;
        self.produced += 1;
        Produce::Buffer(NativeBuffer::new(data).with_offsets(Some(offset), Some(self.offset)))
    }
}

// ==================== Graph ====================

/// Source plus filter effects, everything the streaming thread needs
struct Chain {
    source: Box<dyn BufferSource>,
    effects: FilterEffects,
}

/// A built graph of the reference engine
pub struct SimGraph {
    chain: Option<Chain>,
    sink: SinkHandle,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SimGraph {
    fn new(chain: Chain, sink: SinkHandle) -> Self {
        Self {
            chain: Some(chain),
            sink,
            stop: None,
            thread: None,
        }
    }
}

impl Graph for SimGraph {
    fn play(&mut self) -> Result<(), NativeError> {
        let Some(chain) = self.chain.take() else {
            return Ok(());
        };

        let (stop_tx, stop_rx) = bounded(0);
        let sink = self.sink.clone();
        let thread = std::thread::Builder::new()
            .name(format!("sim-src-{}", sink.instance_id()))
            .spawn(move || stream(chain, sink, stop_rx))
            .map_err(|e| {
                NativeError::new(
                    ErrorDomain::Core,
                    codes::CORE_STATE_CHANGE,
                    "Failed to start streaming thread.",
                )
                .with_debug(e.to_string())
            })?;

        self.stop = Some(stop_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.chain = None;
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(instance = self.sink.instance_id(), "streaming thread panicked");
            }
        }
    }
}

impl Drop for SimGraph {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Streaming thread body. A panicking source is reported as a stream error.
fn stream(chain: Chain, sink: SinkHandle, stop: Receiver<()>) {
    let instance = sink.instance_id();
    tracing::debug!(instance, "streaming thread started");

    let mut pushed: u64 = 0;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| pump(chain, &sink, &stop, &mut pushed)));
    if outcome.is_err() {
        tracing::error!(instance, pushed, "streaming thread panicked");
        sink.post_error(NativeError::new(
            ErrorDomain::Core,
            codes::CORE_FAILED,
            "Internal data stream error.",
        ));
    }

    tracing::debug!(instance, pushed, "streaming thread finished");
}

/// Pull from the source and push into the sink until EOS, an error or stop.
fn pump(mut chain: Chain, sink: &SinkHandle, stop: &Receiver<()>, pushed: &mut u64) {
    let instance = sink.instance_id();
    loop {
        let mut wait = chain.effects.sleep;
        if *pushed > 0 {
            wait += chain.source.pacing().unwrap_or_default();
        }
        let stopped = if wait.is_zero() {
            !matches!(stop.try_recv(), Err(TryRecvError::Empty))
        } else {
            !matches!(stop.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
        };
        if stopped {
            break;
        }

        if chain.effects.error_after.is_some_and(|limit| *pushed >= limit) {
            sink.post_error(NativeError::new(
                ErrorDomain::Core,
                codes::CORE_FAILED,
                "Failed after iterations as requested.",
            ));
            break;
        }

        match chain.source.produce() {
            Produce::Buffer(buffer) => {
                if sink.push_sample(buffer) == FlowReturn::Flushing {
                    tracing::debug!(instance, pushed = *pushed, "sink flushing, stopping");
                    break;
                }
                *pushed += 1;
            }
            Produce::EndOfStream => {
                sink.post_end_of_stream();
                break;
            }
            Produce::Error(err) => {
                sink.post_error(err);
                break;
            }
        }
    }
}

// ==================== Engine ====================

const SOURCES: &[&str] = &["fakesrc", "videotestsrc", "filesrc"];
const FILTERS: &[&str] = &["identity", "queue"];
const SINKS: &[&str] = &["appsink"];

/// The reference engine
#[derive(Debug, Clone, Default)]
pub struct SimEngine {
    config: SimConfig,
}

impl SimEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn build_source(
        &self,
        element: &ElementSpec,
        seed: u64,
    ) -> Result<Box<dyn BufferSource>, NativeError> {
        match element.factory.as_str() {
            "fakesrc" => {
                check_properties(
                    element,
                    &["num-buffers", "sizetype", "sizemin", "sizemax", "filltype"],
                )?;
                let settings = FakeSrcSettings {
                    num_buffers: prop_num_buffers(element)?,
                    sizetype: prop(element, "sizetype")?.unwrap_or(SizeType::Empty),
                    sizemin: prop(element, "sizemin")?.unwrap_or(0),
                    sizemax: prop(element, "sizemax")?.unwrap_or(self.config.default_sizemax),
                    filltype: prop(element, "filltype")?.unwrap_or(FillType::Nothing),
                };
                if settings.sizemax > MAX_BUFFER_SIZE {
                    return Err(could_not_set(element, "sizemax", &settings.sizemax.to_string()));
                }
                if settings.sizemin > settings.sizemax {
                    return Err(could_not_set(element, "sizemin", &settings.sizemin.to_string()));
                }
                Ok(Box::new(FakeSrc {
                    settings,
                    produced: 0,
                    offset: 0,
                    rng: XorShift::new(seed),
                }))
            }
            "videotestsrc" => {
                check_properties(
                    element,
                    &["num-buffers", "width", "height", "framerate", "is-live"],
                )?;
                let framerate = match element.property("framerate") {
                    Some(value) => parse_fraction(value)
                        .ok_or_else(|| could_not_set(element, "framerate", value))?,
                    None => parse_fraction(&self.config.default_framerate).unwrap_or((30, 1)),
                };
                let settings = VideoTestSrcSettings {
                    num_buffers: prop_num_buffers(element)?,
                    width: prop(element, "width")?.unwrap_or(self.config.default_width),
                    height: prop(element, "height")?.unwrap_or(self.config.default_height),
                    framerate,
                    is_live: prop_bool(element, "is-live")?.unwrap_or(false),
                };
                let frame_size = settings.width as u64 * settings.height as u64 * 4;
                if frame_size > MAX_BUFFER_SIZE as u64 {
                    return Err(could_not_set(element, "width", &settings.width.to_string()));
                }
                Ok(Box::new(VideoTestSrc { settings, frame: 0 }))
            }
            "filesrc" => {
                check_properties(element, &["location", "blocksize", "num-buffers"])?;
                let blocksize: usize =
                    prop(element, "blocksize")?.unwrap_or(self.config.default_blocksize);
                if blocksize == 0 || blocksize > MAX_BUFFER_SIZE {
                    return Err(could_not_set(element, "blocksize", &blocksize.to_string()));
                }
                let settings = FileSrcSettings {
                    location: element.property("location").map(PathBuf::from),
                    blocksize,
                    num_buffers: prop_num_buffers(element)?,
                };
                Ok(Box::new(FileSrc {
                    settings,
                    file: None,
                    offset: 0,
                    produced: 0,
                }))
            }
            other => Err(link_error(format!("\"{}\" is not a source element", other))),
        }
    }

    fn apply_filter(element: &ElementSpec, effects: &mut FilterEffects) -> Result<(), NativeError> {
        match element.factory.as_str() {
            "identity" => {
                check_properties(element, &["silent", "sleep-time", "error-after"])?;
                prop_bool(element, "silent")?;
                if let Some(micros) = prop::<u64>(element, "sleep-time")? {
                    effects.sleep += Duration::from_micros(micros);
                }
                match prop::<i64>(element, "error-after")? {
                    None | Some(-1) => {}
                    Some(n) if n >= 0 => {
                        let n = n as u64;
                        effects.error_after = Some(effects.error_after.map_or(n, |e| e.min(n)));
                    }
                    Some(n) => return Err(could_not_set(element, "error-after", &n.to_string())),
                }
                Ok(())
            }
            "queue" => {
                check_properties(element, &["max-size-buffers"])?;
                prop::<u32>(element, "max-size-buffers")?;
                Ok(())
            }
            other => Err(link_error(format!(
                "could not link \"{}\" in the middle of a chain",
                other
            ))),
        }
    }

    fn build_chain(
        &self,
        elements: &[ElementSpec],
        sink: &SinkHandle,
    ) -> Result<Chain, NativeError> {
        for element in elements {
            let factory = element.factory.as_str();
            let known = SOURCES.contains(&factory)
                || FILTERS.contains(&factory)
                || SINKS.contains(&factory);
            if !known {
                return Err(NativeError::new(
                    ErrorDomain::Parse,
                    codes::PARSE_NO_SUCH_ELEMENT,
                    format!("no element \"{}\"", factory),
                ));
            }
        }

        let (Some(first), Some(last)) = (elements.first(), elements.last()) else {
            return Err(NativeError::new(
                ErrorDomain::Parse,
                codes::PARSE_EMPTY,
                "empty pipeline not allowed",
            ));
        };
        if elements.len() < 2 {
            return Err(link_error(format!("could not link \"{}\": no peer", first.factory)));
        }

        if last.factory != "appsink" {
            return Err(link_error(format!(
                "\"{}\" has no sink pad to terminate the chain",
                last.factory
            )));
        }
        check_properties(last, &["sync", "emit-signals"])?;
        prop_bool(last, "sync")?;
        prop_bool(last, "emit-signals")?;
        if last.property("name") != Some(sink.name()) {
            return Err(link_error(format!("no sink element named \"{}\"", sink.name())));
        }

        let source = self.build_source(first, sink.instance_id())?;
        let mut effects = FilterEffects::default();
        for element in &elements[1..elements.len() - 1] {
            Self::apply_filter(element, &mut effects)?;
        }

        Ok(Chain { source, effects })
    }
}

impl Engine for SimEngine {
    fn launch(&self, description: &str, sink: SinkHandle) -> Result<Box<dyn Graph>, NativeError> {
        let elements = parse_description(description)?;
        let chain = self.build_chain(&elements, &sink)?;
        tracing::debug!(
            instance = sink.instance_id(),
            elements = elements.len(),
            "graph built"
        );
        Ok(Box::new(SimGraph::new(chain, sink)))
    }
}
