//! # Reconnect Gate
//!
//! While a reconnect is in progress every operation waits here instead
//! of touching the broker.

use tokio::sync::watch;

#[derive(Debug)]
pub struct ReconnectGate {
    in_progress: watch::Sender<bool>,
}

impl Default for ReconnectGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectGate {
    pub fn new() -> Self {
        let (in_progress, _) = watch::channel(false);
        Self { in_progress }
    }

    pub fn close(&self) {
        self.in_progress.send_replace(true);
    }

    pub fn open(&self) {
        self.in_progress.send_replace(false);
    }

    pub fn is_closed(&self) -> bool {
        *self.in_progress.borrow()
    }

    /// Wait until no reconnect is in progress.
    pub async fn wait(&self) {
        let mut receiver = self.in_progress.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = receiver.wait_for(|in_progress| !*in_progress).await;
    }
}
