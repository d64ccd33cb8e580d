// THEORY:
// Capture produces frames far faster than lights move, and estimation is the
// expensive part of a cycle. This module keeps the capture side from ever
// waiting on it:
//
// 1.  **Rate Limiting**: a frame arriving sooner than the minimum interval
//     after the last accepted frame is dropped before any work is done.
// 2.  **Single Worker**: accepted frames go to one background task through a
//     channel of capacity one. When it is full the worker is still busy and
//     the frame is dropped; submission never blocks.
// 3.  **Blocking Work Off the Runtime**: the worker runs the pipeline inside
//     `spawn_blocking`, so pixel work never stalls the async reactor that also
//     drives the transport.

use crate::error::EstimateError;
use crate::pipeline::{EstimationPipeline, LightBatch};
use image::RgbaImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Admits at most one frame per interval.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    /// Would a frame arriving at `now` be admitted?
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }
}

#[derive(Clone)]
pub struct FrameBuffer {
    pub image: RgbaImage,
    pub frame_id: u64,
    pub timestamp: Instant,
}

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAdmission {
    Accepted(u64),
    RateLimited,
    Busy,
    Closed,
}

/// Result of one estimation cycle.
#[derive(Debug, Clone)]
pub struct EstimatedFrame {
    pub frame_id: u64,
    pub batch: LightBatch,
    /// Time from submission to finished estimate.
    pub latency: Duration,
}

pub struct EstimationWorker {
    frame_sender: mpsc::Sender<FrameBuffer>,
    limiter: RateLimiter,
    frame_counter: u64,
    worker: JoinHandle<()>,
}

impl EstimationWorker {
    /// Spawns the background task. Finished estimates are sent to `results`.
    pub fn spawn(pipeline: EstimationPipeline, results: mpsc::UnboundedSender<EstimatedFrame>) -> Self {
        let limiter = RateLimiter::new(pipeline.config().min_analysis_interval);
        let pipeline = Arc::new(pipeline);
        let (frame_sender, mut frame_receiver) = mpsc::channel::<FrameBuffer>(1);

        let worker = tokio::spawn(async move {
            while let Some(frame) = frame_receiver.recv().await {
                let frame_id = frame.frame_id;
                match Self::process_frame_worker(pipeline.clone(), frame).await {
                    Ok(estimated) => {
                        debug!(frame_id, lights = estimated.batch.len(), "frame estimated");
                        if results.send(estimated).is_err() {
                            break;
                        }
                    }
                    Err(err) => error!(frame_id, %err, "frame estimation failed"),
                }
            }
            debug!("estimation worker stopped");
        });

        Self {
            frame_sender,
            limiter,
            frame_counter: 0,
            worker,
        }
    }

    async fn process_frame_worker(
        pipeline: Arc<EstimationPipeline>,
        frame: FrameBuffer,
    ) -> Result<EstimatedFrame, EstimateError> {
        let FrameBuffer {
            image,
            frame_id,
            timestamp,
        } = frame;
        let batch = tokio::task::spawn_blocking(move || pipeline.generate_batch(&image))
            .await
            .map_err(|_| EstimateError::WorkerClosed)??;
        Ok(EstimatedFrame {
            frame_id,
            batch,
            latency: timestamp.elapsed(),
        })
    }

    pub fn submit(&mut self, image: RgbaImage) -> FrameAdmission {
        self.submit_at(image, Instant::now())
    }

    /// Submits a frame captured at `now`. Never blocks.
    pub fn submit_at(&mut self, image: RgbaImage, now: Instant) -> FrameAdmission {
        if !self.limiter.is_ready(now) {
            return FrameAdmission::RateLimited;
        }

        let frame_id = self.frame_counter;
        let frame = FrameBuffer {
            image,
            frame_id,
            timestamp: now,
        };
        match self.frame_sender.try_send(frame) {
            Ok(()) => {
                self.limiter.mark(now);
                self.frame_counter += 1;
                FrameAdmission::Accepted(frame_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => FrameAdmission::Busy,
            Err(mpsc::error::TrySendError::Closed(_)) => FrameAdmission::Closed,
        }
    }

    /// Stops accepting frames and waits for the frame in progress.
    pub async fn shutdown(self) -> Result<(), EstimateError> {
        drop(self.frame_sender);
        self.worker.await.map_err(|_| EstimateError::WorkerClosed)
    }
}
