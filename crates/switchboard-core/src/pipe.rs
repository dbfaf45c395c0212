//! In-process message pipes.
//!
//! A [`MessagePipe`] is one end of a duplex byte channel. The broker never
//! reads the bytes: it only hands the remote end of an interface request to
//! the target service.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::SwitchboardError;

/// The other end of the pipe has been dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("message pipe peer closed")]
pub struct PipeClosed;

impl From<PipeClosed> for SwitchboardError {
    fn from(_: PipeClosed) -> Self {
        Self::PipeClosed
    }
}

/// One end of a duplex message pipe.
#[derive(Debug)]
pub struct MessagePipe {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MessagePipe {
    /// Create a connected pair of pipe ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }

    /// Send a message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`PipeClosed`] if the peer end has been dropped.
    pub fn send(&self, message: impl Into<Vec<u8>>) -> Result<(), PipeClosed> {
        self.tx.send(message.into()).map_err(|_| PipeClosed)
    }

    /// Receive the next message. Returns `None` once the peer is gone and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    ///
    /// # Errors
    ///
    /// Returns [`PipeClosed`] if the peer is gone and nothing is queued.
    pub fn try_recv(&mut self) -> Result<Option<Vec<u8>>, PipeClosed> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(PipeClosed),
        }
    }

    /// Whether the peer end has been dropped.
    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
