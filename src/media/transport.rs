use anyhow::Result;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Frame handed to the socket writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Sending half of a bidirectional message connection
///
/// A session and its pacer hold the same transport. Sends from the two are
/// never interleaved for one session because the session only sends control
/// frames after its pacer has been told to stop.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Queue one text message
    async fn send_text(&self, text: String) -> Result<()>;

    /// Ask the far end to close; further sends fail
    async fn close(&self) -> Result<()>;
}

/// Transport backed by a bounded channel drained by a socket writer task
///
/// Closing is signalled beside the queue rather than through it, so `close`
/// never waits for queue space and a send parked on a full queue gives up as
/// soon as the transport closes.
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
    closed: watch::Sender<bool>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        let (closed, closed_rx) = watch::channel(false);
        (
            Self { tx, closed },
            OutboundQueue {
                rx,
                closed: closed_rx,
                finished: false,
            },
        )
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&self, text: String) -> Result<()> {
        let mut closed = self.closed.subscribe();

        let permit = tokio::select! {
            biased;
            _ = async { closed.wait_for(|closed| *closed).await.is_ok() } => {
                anyhow::bail!("Transport is closed")
            }
            permit = self.tx.reserve() => {
                permit.map_err(|_| anyhow::anyhow!("Socket writer has gone away"))?
            }
        };

        // The borrow holds off `close` until the frame is queued
        let closed = self.closed.borrow();
        if *closed {
            anyhow::bail!("Transport is closed");
        }
        permit.send(text);

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.send_replace(true) {
            debug!("Closing transport");
        }
        Ok(())
    }
}

/// Receiving end of a `ChannelTransport`
///
/// Yields every queued text frame, then a single `Outbound::Close` once the
/// transport has been closed, then `None`.
pub struct OutboundQueue {
    rx: mpsc::Receiver<String>,
    closed: watch::Receiver<bool>,
    finished: bool,
}

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<Outbound> {
        if self.finished {
            return None;
        }

        let (rx, closed) = (&mut self.rx, &mut self.closed);
        let signalled = tokio::select! {
            biased;
            text = rx.recv() => match text {
                Some(text) => return Some(Outbound::Text(text)),
                None => None,
            },
            signalled = async { closed.wait_for(|closed| *closed).await.is_ok() } => {
                Some(signalled)
            }
        };

        match signalled {
            // Transport dropped without closing
            Some(false) => match self.rx.recv().await {
                Some(text) => Some(Outbound::Text(text)),
                None => self.finish(true),
            },
            _ => self.finish(true),
        }
    }

    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        if self.finished {
            return Err(TryRecvError::Disconnected);
        }

        match self.rx.try_recv() {
            Ok(text) => Ok(Outbound::Text(text)),
            Err(e) => self.finish(e == TryRecvError::Disconnected).ok_or(e),
        }
    }

    /// Emit the close marker if the transport was closed, and stop for good
    /// once nothing more can arrive
    fn finish(&mut self, disconnected: bool) -> Option<Outbound> {
        // Frames queued before the close still go first
        if let Ok(text) = self.rx.try_recv() {
            return Some(Outbound::Text(text));
        }

        let closed = *self.closed.borrow();
        if closed {
            self.finished = true;
            return Some(Outbound::Close);
        }
        if disconnected {
            self.finished = true;
        }
        None
    }
}
