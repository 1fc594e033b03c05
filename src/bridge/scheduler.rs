//! Debounced refresh scheduling
//!
//! Bursty triggers (one per user command) collapse into a single delayed refresh:
//! each [`RefreshScheduler::schedule_refresh`] call cancels the timer armed by the
//! previous one. A refresh that has already started is left to finish.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Something that can re-fetch device state
#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    async fn refresh(&self);
}

pub struct RefreshScheduler {
    target: Arc<dyn Refresh>,
    delay: Duration,
    // Dropping the sender disarms the timer
    armed: Mutex<Option<oneshot::Sender<()>>>,
}

impl RefreshScheduler {
    pub fn new(target: Arc<dyn Refresh>, delay: Duration) -> Self {
        Self {
            target,
            delay,
            armed: Mutex::new(None),
        }
    }

    fn armed(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any armed timer with a new one firing after the debounce delay
    pub fn schedule_refresh(&self) {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let replaced = self.armed().replace(cancel_tx);
        if replaced.is_some_and(|previous| !previous.is_closed()) {
            debug!("Debounced pending refresh");
        }

        let target = self.target.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut cancel_rx => return,
            }
            target.refresh().await;
        });
    }

    /// Disarm the pending timer, if any
    pub fn release(&self) {
        if self.armed().take().is_some_and(|sender| !sender.is_closed()) {
            debug!("Cancelled scheduled refresh");
        }
    }

    /// True while a timer is armed and has not fired yet
    pub fn is_scheduled(&self) -> bool {
        self.armed()
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.release();
    }
}
