//! Shutdown coordination for background tasks.
//!
//! The trigger is latched: a task that starts listening after shutdown was
//! requested still sees it instead of waiting on a message it already missed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Cloneable handle that stops every task listening on it.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Listener for one background task.
    pub fn listen(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
            requested: Arc::clone(&self.requested),
        }
    }

    /// Request shutdown. Only the first call notifies listeners.
    pub fn trigger(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`], owned by a single task.
pub struct ShutdownSignal {
    rx: broadcast::Receiver<()>,
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown is requested, or once every [`Shutdown`] handle is gone.
    ///
    /// Cancel safe, so it can sit in a `select!` loop.
    pub async fn recv(&mut self) {
        if self.requested.load(Ordering::SeqCst) {
            return;
        }
        // A message, a lag or a closed channel all mean stop.
        let _ = self.rx.recv().await;
    }
}
