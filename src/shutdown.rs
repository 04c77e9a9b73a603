use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// A wait or fetch was interrupted by the shutdown signal.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("run cancelled by shutdown signal")]
pub struct Cancelled;

/// Fires the shutdown signal. Held by the ctrl-c listener in `main`.
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cloneable cancellation handle checked by the driver between candidates
/// and raced against every pacing and backoff wait.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownSignal, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSignal { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A handle that can never fire, for contexts with no ctrl-c wiring.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires; pends forever if it never does.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            // Signal half dropped without firing.
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `dur`, aborting early if the shutdown signal fires.
    pub async fn delay(&self, dur: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            _ = tokio::time::sleep(dur) => Ok(()),
            _ = self.cancelled() => Err(Cancelled),
        }
    }
}

// ── Tests ──
