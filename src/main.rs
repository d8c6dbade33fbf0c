//! gstpl-rs - pull samples from a pipeline description
//!
//! Builds a pipeline on the reference engine, starts it and prints one line
//! per received sample until end of stream, `--count` samples, or an error.

use anyhow::{Context, Result};
use clap::Parser;
use gstpl_rs::{BridgeConfig, Pipeline, Sample, SimEngine};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Pull samples from a media pipeline description")]
struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop after this many samples.
    #[arg(long)]
    count: Option<u64>,
    /// Print one JSON object per sample.
    #[arg(long)]
    json: bool,
    /// Pipeline description, e.g. `fakesrc num-buffers=5`.
    #[arg(required = true, num_args = 1..)]
    description: Vec<String>,
}

#[derive(Serialize)]
struct SampleLine {
    index: u64,
    size: usize,
    pts_ns: Option<u128>,
    dts_ns: Option<u128>,
    duration_ns: Option<u128>,
    offset: Option<u64>,
    offset_end: Option<u64>,
}

impl SampleLine {
    fn new(index: u64, sample: &Sample) -> Self {
        Self {
            index,
            size: sample.len(),
            pts_ns: sample.pts().map(|d| d.as_nanos()),
            dts_ns: sample.dts().map(|d| d.as_nanos()),
            duration_ns: sample.duration().map(|d| d.as_nanos()),
            offset: sample.offset(),
            offset_end: sample.offset_end(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BridgeConfig::load_or_default(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    config.apply();

    let description = cli.description.join(" ");
    let engine = Arc::new(SimEngine::with_config(config.sim.clone()));
    let pipeline = Pipeline::with_engine(&description, engine)
        .with_context(|| format!("building pipeline `{}`", description))?;
    pipeline.start().context("starting pipeline")?;

    let mut received = 0u64;
    let outcome = loop {
        if cli.count.is_some_and(|limit| received >= limit) {
            break Ok(());
        }
        match pipeline.recv() {
            Ok(sample) => {
                let line = SampleLine::new(received, &sample);
                if cli.json {
                    println!("{}", serde_json::to_string(&line)?);
                } else {
                    println!(
                        "#{} {} bytes pts={:?} duration={:?}",
                        line.index,
                        line.size,
                        sample.pts(),
                        sample.duration()
                    );
                }
                received += 1;
            }
            Err(e) if e.is_end_of_stream() => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    pipeline.close()?;
    tracing::info!(samples = received, "done");

    outcome.context("pipeline failed")
}
