//! Integration tests for pipeline lifecycle
//!
//! These tests validate the complete pipeline workflow:
//! - Worker start and stop
//! - Frames flowing from intake to output and per-stream queues
//! - Parameter changes while running
//! - Reset and restart

mod common;

use common::builders::{color_frame, depth_frame, COLOR, DEPTH};
use common::wait_for;
use depthvis_rs::capture::SyntheticSource;
use depthvis_rs::pipeline::StartOutcome;
use depthvis_rs::processing::decimation;
use depthvis_rs::{BlockKind, Pipeline, PipelineConfig, PipelineEvent, WorkerState};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn pipeline() -> Pipeline {
    let mut config = PipelineConfig::default();
    config.worker.poll_timeout_ms = 5;
    config.worker.stats_interval_ms = 20;
    Pipeline::new(config).unwrap()
}

#[test]
fn test_pipeline_creation_and_shutdown() {
    let pipeline = pipeline();
    assert_eq!(pipeline.state(), WorkerState::Stopped);

    assert_eq!(pipeline.start().unwrap(), StartOutcome::Started);
    assert_eq!(pipeline.start().unwrap(), StartOutcome::AlreadyRunning);
    assert_eq!(pipeline.state(), WorkerState::Running);

    pipeline.stop().unwrap();
    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), WorkerState::Stopped);

    let events: Vec<_> = pipeline.events().try_iter().collect();
    assert!(matches!(events.first(), Some(PipelineEvent::Started)));
    assert!(matches!(events.last(), Some(PipelineEvent::Stopped)));
}

#[test]
fn test_synchronized_pair_produces_one_sample() {
    let pipeline = pipeline();
    pipeline.activate_stream(DEPTH);
    pipeline.activate_stream(COLOR);
    pipeline.set_post_processing(false);
    pipeline.start().unwrap();

    pipeline.enqueue(depth_frame(1));
    pipeline.enqueue(color_frame(1, 2.0));

    let sample = wait_for(|| pipeline.poll()).expect("no sample produced");
    assert_eq!(sample.frames.len(), 2);
    let points = sample.points.expect("no point cloud");
    assert_eq!(points.len(), 16);
    assert!(points.has_texture());

    assert_eq!(pipeline.poll_stream(DEPTH.uid()).unwrap().number(), 1);
    assert_eq!(pipeline.poll_stream(COLOR.uid()).unwrap().number(), 1);

    pipeline.stop().unwrap();
    let stats = pipeline.stats();
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.framesets_emitted, 1);
    assert_eq!(stats.partial_framesets, 0);
}

#[test]
fn test_color_only_set_reports_mapping_unavailable() {
    let pipeline = pipeline();
    pipeline.set_synchronization(false);
    pipeline.start().unwrap();

    pipeline.enqueue(color_frame(1, 0.0));
    let sample = wait_for(|| pipeline.poll()).unwrap();
    assert!(sample.points.is_none());
    pipeline.stop().unwrap();

    assert!(pipeline
        .events()
        .try_iter()
        .any(|e| matches!(e, PipelineEvent::MappingUnavailable { .. })));
    assert_eq!(pipeline.stats().mapping_unavailable, 1);
}

#[test]
fn test_parameter_change_applies_while_running() {
    let pipeline = pipeline();
    pipeline.set_synchronization(false);
    pipeline.start().unwrap();

    pipeline.enqueue(depth_frame(1));
    let first = wait_for(|| pipeline.poll()).unwrap();
    assert_eq!(first.frames.depth().unwrap().profile().width, 2);

    pipeline
        .set_parameter(BlockKind::Decimation, decimation::MAGNITUDE, 1.0)
        .unwrap();
    pipeline.enqueue(depth_frame(2));
    let second = wait_for(|| pipeline.poll().filter(|s| s.frames.depth().unwrap().number() == 2)).unwrap();
    assert_eq!(second.frames.depth().unwrap().profile().width, 4);

    pipeline.stop().unwrap();
}

#[test]
fn test_reset_clears_results() {
    let pipeline = pipeline();
    pipeline.set_synchronization(false);
    pipeline.start().unwrap();

    pipeline.enqueue(depth_frame(1));
    assert!(wait_for(|| pipeline.registry().get(DEPTH.uid()).filter(|q| !q.is_empty())).is_some());

    pipeline.reset();
    assert!(pipeline.poll().is_none());
    assert!(pipeline.poll_stream(DEPTH.uid()).is_none());

    // Numbering restarts after a reset.
    pipeline.enqueue(depth_frame(1));
    assert!(wait_for(|| pipeline.poll()).is_some());
    pipeline.stop().unwrap();

    assert!(pipeline
        .events()
        .try_iter()
        .any(|e| matches!(e, PipelineEvent::Reset)));
}

#[test]
fn test_restart_preserves_settings() {
    let pipeline = pipeline();
    pipeline.set_block_enabled(BlockKind::Spatial, false);
    pipeline.start().unwrap();
    pipeline.stop().unwrap();
    pipeline.start().unwrap();

    assert!(!pipeline.block_enabled(BlockKind::Spatial));
    assert!(!pipeline.filter_config().spatial.enabled);
    pipeline.stop().unwrap();
}

#[test]
fn test_restart_discards_frames_pending_before_stop() {
    let pipeline = pipeline();
    pipeline.activate_stream(DEPTH);
    pipeline.activate_stream(COLOR);
    pipeline.set_post_processing(false);
    pipeline.start().unwrap();

    // Depth waits for a color partner that only arrives after the restart.
    pipeline.enqueue(depth_frame(1));
    wait_for(|| (pipeline.stats().frames_received == 1).then_some(())).unwrap();
    pipeline.stop().unwrap();
    pipeline.start().unwrap();

    pipeline.enqueue(color_frame(1, 1.0));
    let sample = wait_for(|| pipeline.poll()).expect("color frame never emitted");
    pipeline.stop().unwrap();

    assert_eq!(sample.frames.len(), 1);
    assert!(sample.frames.depth().is_none());
    assert!(sample.frames.color().is_some());
    assert!(sample.points.is_none());
}

#[test]
fn test_concurrent_producer_and_consumer() {
    let pipeline = Arc::new(pipeline());
    let mut source = SyntheticSource::default();
    for stream in source.streams() {
        pipeline.activate_stream(stream);
    }
    pipeline.start().unwrap();

    let producer = {
        let pipeline = pipeline.clone();
        thread::spawn(move || {
            for _ in 0..60 {
                pipeline.enqueue(source.next_frame());
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let mut cycles = Vec::new();
    while !producer.is_finished() {
        if let Some(sample) = pipeline.poll() {
            cycles.push(sample.cycle);
        }
        thread::sleep(Duration::from_millis(2));
    }
    producer.join().unwrap();
    let drained = wait_for(|| {
        let stats = pipeline.stats();
        (stats.frames_received + stats.intake_dropped == 60).then_some(stats)
    });
    if let Some(sample) = pipeline.poll() {
        cycles.push(sample.cycle);
    }
    pipeline.stop().unwrap();

    assert!(drained.is_some(), "worker did not drain the intake queue");
    assert!(!cycles.is_empty());
    assert!(cycles.windows(2).all(|w| w[0] < w[1]));
}
