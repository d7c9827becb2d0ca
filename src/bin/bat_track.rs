use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bat_tracker::{AnnotatingSink, ImageSequenceSource, TrackerConfig, TrackingPipeline};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Track a cricket bat through a directory of video frames.
#[derive(Parser, Debug)]
#[command(name = "bat-track", version)]
struct Args {
    /// Directory of frames, played back in file-name order
    #[arg(long, value_name = "DIR")]
    input: PathBuf,

    /// TOML file overriding the default tracker configuration
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write annotated frames into this directory
    #[arg(long, value_name = "DIR")]
    annotate: Option<PathBuf>,

    /// Nominal frame rate of the sequence
    #[arg(long, default_value_t = 25.0)]
    fps: f64,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };

    let source = ImageSequenceSource::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?
        .with_frame_rate(args.fps);
    info!(input = %args.input.display(), frames = source.remaining(), "input opened");

    let mut pipeline = TrackingPipeline::new(source, config).context("building tracker")?;
    if let Some(dir) = &args.annotate {
        let sink = AnnotatingSink::new(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        pipeline.add_sink(sink);
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_error = None;
    let summary = pipeline.run_with(|result| {
        let line = serde_json::to_string(result)
            .map_err(anyhow::Error::from)
            .and_then(|line| writeln!(out, "{line}").map_err(anyhow::Error::from));
        if let Err(err) = line {
            write_error = Some(err);
            return ControlFlow::Break(());
        }
        match args.max_frames {
            Some(max) if result.frame_index + 1 >= max => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    })?;
    out.flush()?;

    if let Some(err) = write_error {
        error!(%err, "failed to write results");
        return Err(err.context("writing results"));
    }

    info!(
        frames = summary.frames,
        measured = summary.measured,
        resets = summary.resets,
        "done"
    );
    Ok(())
}
