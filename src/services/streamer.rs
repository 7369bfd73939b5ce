use super::FailureStreak;
use crate::error::{CaptureError, FrameError};
use crate::frame::{FrameEncoder, FrameMessage};
use crate::hardware::FrameSource;
use crate::readings::SharedReadings;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Counters for one streaming run, returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub sent: u64,
    pub capture_failures: u64,
    pub send_failures: u64,
}

/// Everything a streaming loop needs. Cloned into each attachment's task.
#[derive(Clone)]
pub struct FrameStreamer {
    camera: Arc<Mutex<Box<dyn FrameSource>>>,
    camera_name: Arc<str>,
    encoder: FrameEncoder,
    readings: SharedReadings,
    period: Duration,
}

impl FrameStreamer {
    pub fn new(
        camera: Box<dyn FrameSource>,
        encoder: FrameEncoder,
        readings: SharedReadings,
        period: Duration,
    ) -> Self {
        Self {
            camera_name: Arc::from(camera.name()),
            camera: Arc::new(Mutex::new(camera)),
            encoder,
            readings,
            period,
        }
    }

    /// Runs until `cancel` fires. Every await point also watches `cancel`, so
    /// the task exits within one frame period of detach.
    pub fn spawn(
        &self,
        session_id: Uuid,
        tx: mpsc::Sender<FrameMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<StreamStats> {
        let streamer = self.clone();
        tokio::spawn(async move { streamer.run(session_id, tx, cancel).await })
    }

    async fn run(
        self,
        session_id: Uuid,
        tx: mpsc::Sender<FrameMessage>,
        cancel: CancellationToken,
    ) -> StreamStats {
        tracing::info!(session = %session_id, camera = %self.camera_name, "frame streaming started");
        let mut stats = StreamStats::default();
        let mut capture_streak = FailureStreak::default();
        let mut send_streak = FailureStreak::default();
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let image = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                image = self.next_image() => image,
            };
            let image = match image {
                Ok(image) => {
                    if let Some(failures) = capture_streak.succeed() {
                        tracing::info!(session = %session_id, failures, "camera frames flowing again");
                    }
                    image
                }
                Err(err) => {
                    stats.capture_failures += 1;
                    if capture_streak.fail() {
                        tracing::warn!(session = %session_id, error = %err, "frame skipped");
                    } else {
                        tracing::debug!(session = %session_id, error = %err, "frame skipped");
                    }
                    continue;
                }
            };

            if cancel.is_cancelled() {
                break;
            }
            let message = FrameMessage::new(&self.readings.get(), image);
            match tx.try_send(message) {
                Ok(()) => {
                    stats.sent += 1;
                    send_streak.succeed();
                }
                Err(err) => {
                    stats.send_failures += 1;
                    let reason = match err {
                        TrySendError::Full(_) => "viewer queue full",
                        TrySendError::Closed(_) => "viewer channel closed",
                    };
                    if send_streak.fail() {
                        tracing::debug!(session = %session_id, reason, "frame not delivered");
                    }
                }
            }
        }

        tracing::info!(
            session = %session_id,
            sent = stats.sent,
            capture_failures = stats.capture_failures,
            send_failures = stats.send_failures,
            "frame streaming stopped"
        );
        stats
    }

    /// Capture and encode off the async workers. The camera lock serializes
    /// device access even if an abandoned capture is still finishing.
    async fn next_image(&self) -> Result<Bytes, FrameError> {
        let camera = self.camera.clone();
        let encoder = self.encoder;
        tokio::task::spawn_blocking(move || -> Result<Bytes, FrameError> {
            let frame = {
                let mut guard = camera
                    .lock()
                    .map_err(|_| CaptureError::Poisoned)?;
                guard.capture()?
            };
            Ok(encoder.encode(frame)?)
        })
        .await
        .unwrap_or_else(|err| Err(FrameError::Worker(err.to_string())))
    }
}
