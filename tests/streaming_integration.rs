//! Integration tests for sample delivery
//!
//! These tests validate the complete data path:
//! - Ordered delivery followed by end of stream
//! - Close latency while a producer is running
//! - Runtime errors from the engine
//! - Isolation between concurrently running pipelines

mod common;

use common::builders::{FakeSrcBuilder, VideoTestSrcBuilder};
use common::mock_helpers::{Ending, ScriptedEngine};
use common::{assert_between, drain, test_timeout, timed};
use gstpl_rs::engine::codes;
use gstpl_rs::{
    context, ErrorDomain, FlowReturn, NativeBuffer, NativeError, Pipeline, PipelineError,
    SimConfig, SimEngine,
};
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
#[serial]
fn test_fakesrc_fixed_buffers_then_eos() {
    let desc = FakeSrcBuilder::new().num_buffers(5).fixed(42).build();
    let pipeline = Pipeline::new(&desc).unwrap();
    pipeline.start().unwrap();

    let (samples, err) = drain(&pipeline);
    assert_eq!(samples.len(), 5);
    assert!(samples.iter().all(|s| s.len() == 42));
    assert!(matches!(err, PipelineError::EndOfStream));

    // End of stream is sticky
    assert!(pipeline.recv().unwrap_err().is_end_of_stream());
    pipeline.close().unwrap();
}

#[test]
#[serial]
fn test_iterator_stops_at_eos() {
    let desc = FakeSrcBuilder::new().num_buffers(4).fixed(8).build();
    let pipeline = Pipeline::new(&desc).unwrap();
    pipeline.start().unwrap();

    let sizes: Vec<usize> = pipeline.iter().map(|s| s.unwrap().len()).collect();
    assert_eq!(sizes, vec![8; 4]);
}

#[test]
#[serial]
fn test_samples_arrive_in_order() {
    let engine = ScriptedEngine::numbered(10, 3, Ending::EndOfStream);
    let pipeline = Pipeline::with_engine("scripted", Arc::new(engine.clone())).unwrap();
    pipeline.start().unwrap();

    let (samples, err) = drain(&pipeline);
    assert!(err.is_end_of_stream());
    let firsts: Vec<u8> = samples.iter().map(|s| s.data()[0]).collect();
    assert_eq!(firsts, (0..10).collect::<Vec<u8>>());

    pipeline.close().unwrap();
    assert!(engine.flows.lock().iter().all(|f| *f == FlowReturn::Ok));
}

#[test]
#[serial]
fn test_videotestsrc_timestamps() {
    let desc = VideoTestSrcBuilder::new()
        .num_buffers(3)
        .size(4, 2)
        .framerate("10/1")
        .build();
    let pipeline = Pipeline::new(&desc).unwrap();
    pipeline.start().unwrap();

    let (samples, err) = drain(&pipeline);
    assert!(err.is_end_of_stream());
    assert_eq!(samples.len(), 3);
    for (i, sample) in samples.iter().enumerate() {
        assert_eq!(sample.len(), 4 * 2 * 4);
        assert_eq!(sample.pts(), Some(Duration::from_millis(100 * i as u64)));
        assert_eq!(sample.duration(), Some(Duration::from_millis(100)));
    }
}

#[test]
#[serial]
fn test_close_while_playing_wakes_recv() {
    let pipeline = Pipeline::new(&VideoTestSrcBuilder::new().build()).unwrap();
    pipeline.start().unwrap();

    let ((received, err), elapsed) = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            pipeline.close().unwrap();
        });
        timed(|| drain(&pipeline))
    });

    assert!(!received.is_empty());
    assert!(err.is_end_of_stream());
    assert_between(
        elapsed,
        Duration::from_millis(100),
        Duration::from_millis(100) + test_timeout(),
    );
}

#[test]
#[serial]
fn test_close_releases_blocked_producer() {
    let engine = ScriptedEngine::numbered(3, 1, Ending::EndOfStream);
    let pipeline = Pipeline::with_engine("scripted", Arc::new(engine.clone())).unwrap();
    pipeline.start().unwrap();

    // Nobody receives; the first push stays blocked until close
    thread::sleep(Duration::from_millis(50));
    let (_, elapsed) = timed(|| pipeline.close().unwrap());
    assert!(elapsed < test_timeout());

    assert_eq!(*engine.flows.lock(), vec![FlowReturn::Flushing]);
}

#[test]
#[serial]
fn test_missing_file_reports_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.bin");
    let pipeline = Pipeline::new(&format!("filesrc location={}", missing.display())).unwrap();

    let err = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            pipeline.start().unwrap();
        });
        pipeline.recv().unwrap_err()
    });

    let engine_err = err.engine_error().expect("runtime error expected");
    assert!(matches!(err, PipelineError::Runtime(_)));
    assert_eq!(engine_err.domain, ErrorDomain::Resource);
    assert_eq!(engine_err.code, codes::RESOURCE_NOT_FOUND);

    // Sticky, and does not turn into end of stream
    let again = pipeline.recv().unwrap_err();
    assert_eq!(again.engine_error(), Some(engine_err));
    pipeline.close().unwrap();
}

#[test]
#[serial]
fn test_filesrc_reads_file_in_blocks() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &[1u8; 10]).unwrap();

    let desc = format!("filesrc location={} blocksize=4", file.path().display());
    let pipeline = Pipeline::new(&desc).unwrap();
    pipeline.start().unwrap();

    let (samples, err) = drain(&pipeline);
    assert!(err.is_end_of_stream());
    let sizes: Vec<usize> = samples.iter().map(|s| s.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[test]
#[serial]
fn test_oversized_random_fakesrc_is_rejected_at_build() {
    let before = context::ref_count();
    let desc = format!("fakesrc sizetype=random sizemin=0 sizemax={}", u64::MAX);

    let err = Pipeline::new(&desc).unwrap_err();
    assert!(matches!(err, PipelineError::Build(_)));
    assert_eq!(err.engine_error().unwrap().code, codes::PARSE_COULD_NOT_SET_PROPERTY);
    assert_eq!(context::ref_count(), before);
}

#[test]
#[serial]
fn test_error_after_delivers_samples_then_error() {
    let desc = FakeSrcBuilder::new()
        .fixed(16)
        .then("identity error-after=3")
        .build();
    let pipeline = Pipeline::new(&desc).unwrap();
    pipeline.start().unwrap();

    let (samples, err) = drain(&pipeline);
    assert_eq!(samples.len(), 3);
    let engine_err = err.engine_error().unwrap();
    assert_eq!(engine_err.domain, ErrorDomain::Core);
    assert_eq!(engine_err.code, codes::CORE_FAILED);
}

#[test]
#[serial]
fn test_iterator_yields_runtime_error_once() {
    let engine = ScriptedEngine::numbered(
        2,
        1,
        Ending::Error(NativeError::new(ErrorDomain::Stream, 1, "decode failed")),
    );
    let pipeline = Pipeline::with_engine("scripted", Arc::new(engine)).unwrap();
    pipeline.start().unwrap();

    let items: Vec<_> = pipeline.iter().collect();
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok() && items[1].is_ok());
    let err = items[2].as_ref().unwrap_err();
    assert_eq!(err.engine_error().unwrap().message, "decode failed");
}

#[test]
#[serial]
fn test_parallel_pipelines_are_independent() {
    let before = context::ref_count();

    thread::scope(|s| {
        for n in 1..=4i64 {
            s.spawn(move || {
                let desc = FakeSrcBuilder::new().num_buffers(n * 3).fixed(n as usize).build();
                let pipeline = Pipeline::new(&desc).unwrap();
                pipeline.start().unwrap();
                let (samples, err) = drain(&pipeline);
                assert_eq!(samples.len() as i64, n * 3);
                assert!(samples.iter().all(|s| s.len() == n as usize));
                assert!(err.is_end_of_stream());
            });
        }
    });

    assert_eq!(context::ref_count(), before);
}

#[test]
#[serial]
fn test_slow_consumer_does_not_stall_other_pipelines() {
    let slow = Pipeline::new(&VideoTestSrcBuilder::new().size(2, 2).build()).unwrap();
    let fast = Pipeline::new(&FakeSrcBuilder::new().num_buffers(50).fixed(1).build()).unwrap();
    slow.start().unwrap();
    fast.start().unwrap();

    // Take a single sample from the slow one and leave its producer blocked
    slow.recv().unwrap();

    let ((samples, err), elapsed) = timed(|| drain(&fast));
    assert_eq!(samples.len(), 50);
    assert!(err.is_end_of_stream());
    assert!(elapsed < test_timeout());

    slow.close().unwrap();
    fast.close().unwrap();
}

#[test]
#[serial]
fn test_live_source_paces_samples() {
    let desc = VideoTestSrcBuilder::new()
        .num_buffers(3)
        .size(2, 2)
        .framerate("20/1")
        .live()
        .build();
    let pipeline = Pipeline::new(&desc).unwrap();
    pipeline.start().unwrap();

    let ((samples, _), elapsed) = timed(|| drain(&pipeline));
    assert_eq!(samples.len(), 3);
    // Two frame intervals between three frames
    assert_between(elapsed, Duration::from_millis(90), test_timeout());
}

#[test]
#[serial]
fn test_engine_config_defaults_apply() {
    let engine = SimEngine::with_config(SimConfig {
        default_width: 2,
        default_height: 3,
        ..SimConfig::default()
    });
    let pipeline = Pipeline::with_engine("videotestsrc num-buffers=1", Arc::new(engine)).unwrap();
    pipeline.start().unwrap();

    let sample = pipeline.recv().unwrap();
    assert_eq!(sample.len(), 2 * 3 * 4);
}

#[test]
#[serial]
fn test_drop_closes_pipeline() {
    let before = context::ref_count();
    {
        let pipeline = Pipeline::new(&VideoTestSrcBuilder::new().build()).unwrap();
        pipeline.start().unwrap();
        pipeline.recv().unwrap();
    }
    assert_eq!(context::ref_count(), before);
}

#[test]
#[serial]
fn test_scripted_buffer_metadata_is_preserved() {
    let buffer = NativeBuffer::new(vec![9; 2])
        .with_timestamps(Some(Duration::from_millis(5)), Some(Duration::from_millis(4)))
        .with_duration(Some(Duration::from_millis(1)))
        .with_offsets(Some(10), Some(12));
    let engine = ScriptedEngine::new(vec![buffer], Ending::Hang);
    let pipeline = Pipeline::with_engine("scripted", Arc::new(engine)).unwrap();
    pipeline.start().unwrap();

    let sample = pipeline.recv().unwrap();
    assert_eq!(sample.data(), &[9, 9]);
    assert_eq!(sample.pts(), Some(Duration::from_millis(5)));
    assert_eq!(sample.dts(), Some(Duration::from_millis(4)));
    assert_eq!(sample.duration(), Some(Duration::from_millis(1)));
    assert_eq!(sample.offset(), Some(10));
    assert_eq!(sample.offset_end(), Some(12));

    let (_, elapsed) = timed(|| pipeline.close().unwrap());
    assert!(elapsed < test_timeout());
}

mod delivery_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        #[serial]
        fn prop_fakesrc_emits_exactly_n(n in 0i64..40, size in 0usize..128) {
            let desc = FakeSrcBuilder::new().num_buffers(n).fixed(size).filltype("pattern").build();
            let pipeline = Pipeline::new(&desc).unwrap();
            pipeline.start().unwrap();

            let (samples, err) = drain(&pipeline);
            prop_assert!(err.is_end_of_stream());
            prop_assert_eq!(samples.len() as i64, n);
            for (i, sample) in samples.iter().enumerate() {
                prop_assert_eq!(sample.len(), size);
                prop_assert_eq!(sample.offset(), Some((i * size) as u64));
            }
            pipeline.close().unwrap();
        }
    }
}
