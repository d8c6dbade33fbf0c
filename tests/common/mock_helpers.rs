//! Scripted engine for driving the bridge through its public seam

use gstpl_rs::{
    Engine, ErrorDomain, FlowReturn, Graph, NativeBuffer, NativeError, SinkHandle, SINK_STAGE,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// How a scripted stream ends
#[derive(Debug, Clone)]
pub enum Ending {
    EndOfStream,
    Error(NativeError),
    /// Keep the streaming thread alive and silent until shutdown
    Hang,
}

/// Engine that replays a fixed list of buffers on `play`
#[derive(Clone)]
pub struct ScriptedEngine {
    buffers: Vec<NativeBuffer>,
    ending: Ending,
    /// Descriptions received by `launch`, sink stage included
    pub launched: Arc<Mutex<Vec<String>>>,
    /// Flow results seen by the streaming thread, in order
    pub flows: Arc<Mutex<Vec<FlowReturn>>>,
}

impl ScriptedEngine {
    pub fn new(buffers: Vec<NativeBuffer>, ending: Ending) -> Self {
        Self {
            buffers,
            ending,
            launched: Arc::new(Mutex::new(Vec::new())),
            flows: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `count` buffers of `size` bytes, each filled with its index
    pub fn numbered(count: u8, size: usize, ending: Ending) -> Self {
        let buffers = (0..count).map(|i| NativeBuffer::new(vec![i; size])).collect();
        Self::new(buffers, ending)
    }
}

impl Engine for ScriptedEngine {
    fn launch(&self, description: &str, sink: SinkHandle) -> Result<Box<dyn Graph>, NativeError> {
        self.launched.lock().push(description.to_string());
        if !description.ends_with(SINK_STAGE) {
            return Err(NativeError::new(ErrorDomain::Parse, 3, "missing sink stage"));
        }
        Ok(Box::new(ScriptedGraph {
            engine: self.clone(),
            sink: Some(sink),
            thread: None,
        }))
    }
}

pub struct ScriptedGraph {
    engine: ScriptedEngine,
    sink: Option<SinkHandle>,
    thread: Option<JoinHandle<()>>,
}

impl Graph for ScriptedGraph {
    fn play(&mut self) -> Result<(), NativeError> {
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };
        let ScriptedEngine {
            buffers,
            ending,
            flows,
            ..
        } = self.engine.clone();

        self.thread = Some(std::thread::spawn(move || {
            for buffer in buffers {
                let flow = sink.push_sample(buffer);
                flows.lock().push(flow);
                if flow == FlowReturn::Flushing {
                    return;
                }
            }
            match ending {
                Ending::EndOfStream => sink.post_end_of_stream(),
                Ending::Error(err) => sink.post_error(err),
                Ending::Hang => {
                    while !sink.is_flushing() {
                        std::thread::sleep(std::time::Duration::from_millis(5));
                    }
                }
            }
        }));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.sink = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
