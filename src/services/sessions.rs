use super::streamer::{FrameStreamer, StreamStats};
use crate::error::SessionError;
use crate::frame::FrameMessage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewerSession {
    pub id: Uuid,
    pub attached_at: DateTime<Utc>,
}

/// Receiving end handed to the transport for one attached viewer.
pub struct FrameStream {
    session: ViewerSession,
    rx: mpsc::Receiver<FrameMessage>,
}

impl FrameStream {
    pub fn session(&self) -> ViewerSession {
        self.session
    }

    /// `None` once the streaming loop has exited.
    pub async fn recv(&mut self) -> Option<FrameMessage> {
        self.rx.recv().await
    }
}

enum Slot {
    Detached,
    Attached {
        session: ViewerSession,
        cancel: CancellationToken,
        handle: JoinHandle<StreamStats>,
    },
}

/// Owns the single viewer slot. Attach, detach and the loop they start or
/// stop are serialized by one async lock.
pub struct SessionRegistry {
    streamer: FrameStreamer,
    queue_depth: usize,
    slot: Mutex<Slot>,
}

impl SessionRegistry {
    pub fn new(streamer: FrameStreamer, queue_depth: usize) -> Self {
        Self {
            streamer,
            queue_depth: queue_depth.max(1),
            slot: Mutex::new(Slot::Detached),
        }
    }

    pub async fn attach(&self, id: Uuid) -> Result<FrameStream, SessionError> {
        let mut slot = self.slot.lock().await;
        if let Slot::Attached { session, handle, .. } = &*slot {
            if !handle.is_finished() {
                return Err(if session.id == id {
                    SessionError::AlreadyAttached(id.to_string())
                } else {
                    SessionError::Busy {
                        holder: session.id.to_string(),
                    }
                });
            }
        }

        let session = ViewerSession {
            id,
            attached_at: Utc::now(),
        };
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let cancel = CancellationToken::new();
        let handle = self.streamer.spawn(id, tx, cancel.clone());
        *slot = Slot::Attached {
            session,
            cancel,
            handle,
        };
        tracing::info!(session = %id, "viewer attached");
        Ok(FrameStream { session, rx })
    }

    /// Stops the session's loop and waits for it to exit. Returns `false` if
    /// `id` was not the attached session.
    pub async fn detach(&self, id: Uuid) -> bool {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Attached { session, .. } if session.id == id => {}
            _ => {
                tracing::debug!(session = %id, "detach for unknown session ignored");
                return false;
            }
        }

        if let Slot::Attached { cancel, handle, .. } = std::mem::replace(&mut *slot, Slot::Detached) {
            cancel.cancel();
            match handle.await {
                Ok(stats) => tracing::info!(
                    session = %id,
                    sent = stats.sent,
                    capture_failures = stats.capture_failures,
                    send_failures = stats.send_failures,
                    "viewer detached"
                ),
                Err(err) => tracing::warn!(session = %id, error = %err, "streaming task ended abnormally"),
            }
        }
        true
    }

    pub async fn current(&self) -> Option<ViewerSession> {
        match &*self.slot.lock().await {
            Slot::Attached { session, .. } => Some(*session),
            Slot::Detached => None,
        }
    }

    /// Detaches whoever is attached. Used on shutdown.
    pub async fn close(&self) {
        if let Some(session) = self.current().await {
            self.detach(session.id).await;
        }
    }
}
