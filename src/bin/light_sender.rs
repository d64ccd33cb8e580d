// Estimating-side runner: analyses image files as a capture stream and sends
// each cycle's light batch to a renderer.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lumen_sync::config::{DEFAULT_PORT, EstimatorConfig};
use lumen_sync::core_modules::threshold::Polarity;
use lumen_sync::core_modules::utils::image_helper::image_helper;
use lumen_sync::parallel_pipeline::{EstimationWorker, FrameAdmission};
use lumen_sync::pipeline::EstimationPipeline;
use lumen_sync::transport::LightClient;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sources {
    /// Bright light sources.
    Bright,
    /// Dark regions, such as shadows.
    Dark,
}

#[derive(Parser, Debug)]
#[command(name = "light_sender")]
#[command(about = "Estimates light sources in image frames and sends them to a renderer", long_about = None)]
struct Args {
    /// Renderer address
    #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
    renderer: String,

    /// Comma separated light diameters in centimetres, largest light first
    #[arg(long)]
    diameters_cm: Option<String>,

    /// Gray level separating sources from background
    #[arg(long)]
    threshold: Option<u8>,

    /// Which side of the threshold is a source
    #[arg(long, value_enum, default_value = "bright")]
    sources: Sources,

    /// Diagonal field of view of the camera in degrees
    #[arg(long, default_value_t = 80.0)]
    fov: f64,

    /// Minimum time between analysed frames, in milliseconds
    #[arg(long, default_value_t = 300)]
    interval_ms: u64,

    /// Do not mirror frames before analysis
    #[arg(long)]
    no_mirror: bool,

    /// Directory to write each frame's thresholded mask into
    #[arg(long)]
    dump_masks: Option<PathBuf>,

    /// Image files, sent in order as one capture stream
    #[arg(required = true)]
    frames: Vec<PathBuf>,
}

impl Args {
    fn estimator_config(&self) -> EstimatorConfig {
        let (polarity, default_level) = match self.sources {
            Sources::Bright => (Polarity::Bright, 230),
            Sources::Dark => (Polarity::Dark, 50),
        };
        let mut config = EstimatorConfig {
            threshold_level: self.threshold.unwrap_or(default_level),
            polarity,
            mirror_horizontal: !self.no_mirror,
            diagonal_fov_degrees: self.fov,
            min_analysis_interval: Duration::from_millis(self.interval_ms),
            ..EstimatorConfig::default()
        };
        if let Some(list) = &self.diameters_cm {
            config = config.with_diameters_cm(list);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.estimator_config();
    let pipeline = EstimationPipeline::new(config.clone())?;
    info!(sizes_mm = ?config.light_diameters_mm, renderer = %args.renderer, "light sender starting");

    if let Some(dir) = &args.dump_masks {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (i, path) in args.frames.iter().enumerate() {
            let frame = image_helper::load_frame(path).with_context(|| format!("loading {}", path.display()))?;
            let analysis = pipeline.analyze(&frame)?;
            image_helper::save_binary(dir.join(format!("mask_{i:04}.png")), &analysis.binary)?;
        }
    }

    let client = LightClient::new(args.renderer.clone(), Duration::from_secs(5));
    let (result_tx, mut result_rx) = mpsc::unbounded_channel();
    let mut worker = EstimationWorker::spawn(pipeline, result_tx);

    let sender = tokio::spawn(async move {
        let mut sent = 0u64;
        while let Some(estimated) = result_rx.recv().await {
            match client.send_batch(&estimated.batch).await {
                Ok(()) => {
                    sent += 1;
                    debug!(
                        frame_id = estimated.frame_id,
                        lights = estimated.batch.len(),
                        latency_ms = estimated.latency.as_millis() as u64,
                        "batch acknowledged"
                    );
                }
                Err(err) => warn!(frame_id = estimated.frame_id, %err, "batch not delivered"),
            }
        }
        sent
    });

    let mut capture = tokio::time::interval(config.min_analysis_interval.max(Duration::from_millis(1)));
    for path in &args.frames {
        capture.tick().await;
        let frame = match image_helper::load_frame(path) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(path = %path.display(), %err, "frame skipped");
                continue;
            }
        };
        match worker.submit(frame) {
            FrameAdmission::Accepted(frame_id) => debug!(frame_id, path = %path.display(), "frame submitted"),
            other => debug!(?other, path = %path.display(), "frame dropped"),
        }
    }

    worker.shutdown().await?;
    let sent = sender.await?;
    info!(sent, frames = args.frames.len(), "light sender finished");
    Ok(())
}
