use crate::audio::{codec, FrameSource};
use crate::media::{OutboundMedia, Transport};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// How a pacer run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PacerOutcome {
    /// The PCM source was exhausted
    Completed { frames_sent: u64 },
    /// Stopped by its owner (stop event, disconnect or a newer start)
    Cancelled { frames_sent: u64 },
    /// The transport refused a frame
    Failed { frames_sent: u64, reason: String },
}

impl PacerOutcome {
    pub fn frames_sent(&self) -> u64 {
        match self {
            Self::Completed { frames_sent }
            | Self::Cancelled { frames_sent }
            | Self::Failed { frames_sent, .. } => *frames_sent,
        }
    }
}

/// Streams encoded frames to a transport at a fixed cadence
///
/// Each run owns its own chunk counter, starting at 1 and increasing by one
/// per frame sent.
pub struct Pacer {
    stream_sid: String,
    source: FrameSource,
    interval: Duration,
    transport: Arc<dyn Transport>,
}

impl Pacer {
    pub fn new(
        stream_sid: impl Into<String>,
        source: FrameSource,
        interval: Duration,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            stream_sid: stream_sid.into(),
            source,
            interval,
            transport,
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> PacerHandle {
        self.spawn_after(None)
    }

    /// Run on a background task once `previous` (if any) has been cancelled
    /// and has finished, so two runs never send concurrently
    pub fn spawn_after(self, previous: Option<PacerHandle>) -> PacerHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let frames_sent = Arc::new(AtomicU64::new(0));
        let progress = Arc::clone(&frames_sent);

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.cancel();
                let outcome = previous.join().await;
                info!("Superseded pacer finished: {:?}", outcome);
            }

            self.run(cancel_rx, progress).await
        });

        PacerHandle {
            cancel: cancel_tx,
            frames_sent,
            task,
        }
    }

    /// Send every frame of the source, one per interval
    ///
    /// Cancellation is observed while waiting for the next tick and while a
    /// frame is waiting for queue space, so a cancelled run stops within one
    /// interval even when the far end has stopped reading. Dropping the
    /// cancel sender counts as cancellation.
    pub async fn run(
        self,
        mut cancel: watch::Receiver<bool>,
        frames_sent: Arc<AtomicU64>,
    ) -> PacerOutcome {
        info!(
            "Pacer started for stream {} ({} frames, {:?} interval)",
            self.stream_sid,
            self.source.frame_count(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sequence: u64 = 0;

        for frame in self.source.frames() {
            tokio::select! {
                biased;
                _ = cancel.changed() => {
                    return self.cancelled(sequence);
                }
                _ = ticker.tick() => {}
            }

            if *cancel.borrow() {
                return self.cancelled(sequence);
            }

            let payload = codec::encode_frame(&frame.samples);
            let message = OutboundMedia::new(
                &self.stream_sid,
                &payload,
                sequence + 1,
                Utc::now().timestamp_millis(),
            );

            // A stalled socket must not hold off cancellation
            let result = match message.to_json() {
                Ok(text) => tokio::select! {
                    biased;
                    _ = cancel.changed() => {
                        return self.cancelled(sequence);
                    }
                    result = self.transport.send_text(text) => result,
                },
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                // The owner closed the transport right after cancelling us
                if *cancel.borrow() {
                    return self.cancelled(sequence);
                }

                error!(
                    "Failed to send frame {} on stream {}: {:#}",
                    sequence + 1,
                    self.stream_sid,
                    e
                );
                return PacerOutcome::Failed {
                    frames_sent: sequence,
                    reason: format!("{:#}", e),
                };
            }

            sequence += 1;
            frames_sent.store(sequence, Ordering::SeqCst);

            if frame.padded > 0 {
                debug!("Frame {} padded with {} silent samples", sequence, frame.padded);
            }
        }

        info!("Pacer finished for stream {}: {} frames sent", self.stream_sid, sequence);

        PacerOutcome::Completed {
            frames_sent: sequence,
        }
    }

    fn cancelled(&self, frames_sent: u64) -> PacerOutcome {
        info!(
            "Pacer cancelled for stream {} after {} frames",
            self.stream_sid, frames_sent
        );
        PacerOutcome::Cancelled { frames_sent }
    }
}

/// Owner's handle on a running pacer; dropping it cancels the run
pub struct PacerHandle {
    cancel: watch::Sender<bool>,
    frames_sent: Arc<AtomicU64>,
    task: JoinHandle<PacerOutcome>,
}

impl PacerHandle {
    /// Signal the run to stop without waiting for it
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Frames sent so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end
    pub async fn join(self) -> PacerOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => PacerOutcome::Failed {
                frames_sent: self.frames_sent.load(Ordering::SeqCst),
                reason: format!("Pacer task failed: {}", e),
            },
        }
    }
}
