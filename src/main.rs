//! Depth pipeline demo - Main Entry Point
//!
//! Feeds a synthetic depth + color source through the pipeline and logs
//! what comes out the other end.
//!
//! Usage: `depthvis-rs [CONFIG_PATH] [SECONDS]`

use anyhow::Context;
use depthvis_rs::{
    capture::SyntheticSource, config, Pipeline, PipelineConfig, PipelineEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_RUN_SECONDS: u64 = 5;

fn main() -> anyhow::Result<()> {
    // File logging is opt-in; the guard flushes on drop.
    let (file_layer, _log_guard) = match std::env::var_os("DEPTHVIS_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "depthvis.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,depthvis_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!("Starting depth pipeline demo");

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => PipelineConfig::load(&path)
            .with_context(|| format!("loading pipeline config from {}", path))?,
        None => {
            if let Some(path) = config::default_config_path() {
                tracing::debug!("Looking for config at {:?}", path);
            }
            PipelineConfig::load_or_default()
        }
    };
    let seconds = match args.next() {
        Some(s) => s
            .parse::<u64>()
            .with_context(|| format!("invalid run duration {:?}", s))?,
        None => DEFAULT_RUN_SECONDS,
    };

    let pipeline = Arc::new(Pipeline::new(config).context("creating pipeline")?);
    let mut source = SyntheticSource::default();
    for stream in source.streams() {
        pipeline.activate_stream(stream);
    }
    pipeline.start().context("starting pipeline worker")?;

    // Producer thread paces frames at the source's own clock.
    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let pipeline = pipeline.clone();
        let running = running.clone();
        std::thread::Builder::new()
            .name("depthvis-capture".to_string())
            .spawn(move || {
                let started = Instant::now();
                while running.load(Ordering::Relaxed) {
                    let frame = source.next_frame();
                    let due = Duration::from_secs_f64(frame.timestamp().millis / 1000.0);
                    if let Some(wait) = due.checked_sub(started.elapsed()) {
                        std::thread::sleep(wait);
                    }
                    pipeline.enqueue(frame);
                }
            })
            .context("spawning capture thread")?
    };

    let events = pipeline.events();
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut last_cycle = 0;
    while Instant::now() < deadline {
        if let Some(sample) = pipeline.poll() {
            if sample.cycle != last_cycle {
                last_cycle = sample.cycle;
                match &sample.points {
                    Some(points) => tracing::info!(
                        "Cycle {}: {} frames, {} points{}",
                        sample.cycle,
                        sample.frames.len(),
                        points.len(),
                        if points.has_texture() { " (textured)" } else { "" }
                    ),
                    None => tracing::info!("Cycle {}: no point cloud", sample.cycle),
                }
            }
        }

        for event in events.try_iter() {
            match event {
                PipelineEvent::Stats(stats) => tracing::info!(
                    "{} sets, {:.1}% complete, avg cycle {:.0}us",
                    stats.framesets_emitted,
                    stats.completion_rate(),
                    stats.avg_cycle_us
                ),
                PipelineEvent::FilterStageFailed { block, message } => {
                    tracing::warn!("{} skipped: {}", block, message)
                }
                PipelineEvent::SyncTimingInvalid { message } => tracing::warn!("{}", message),
                other => tracing::debug!("{:?}", other),
            }
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    tracing::info!("Shutting down...");
    running.store(false, Ordering::Relaxed);
    if producer.join().is_err() {
        tracing::error!("Capture thread panicked");
    }
    pipeline.stop().context("stopping pipeline worker")?;

    let stats = pipeline.stats();
    tracing::info!(
        "Done: {} frames in, {} results out, {} intake drops",
        stats.frames_received,
        stats.results_published,
        stats.intake_dropped
    );
    Ok(())
}
