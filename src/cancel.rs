//! Cooperative cancellation.
//!
//! Ctrl-C flips a shared flag instead of killing the process. The chain
//! applier checks it between steps and races it against a running patcher,
//! so an interrupted run removes its partial files before exiting.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation handle. All clones observe the same flag.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only errors if it was
        // dropped, which can't happen while we hold a clone.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Spawn a task that cancels on Ctrl-C. Must be called inside a runtime.
    pub fn cancel_on_ctrl_c(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, finishing up...");
                this.cancel();
            }
        });
    }
}
