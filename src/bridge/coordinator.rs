//! Platform poll loop
//!
//! [`UpdateCoordinator`] re-runs the initial data load at a fixed interval and classifies
//! each attempt. A failed refresh is never fatal: it marks the data stale and the next
//! tick tries again. Only an authentication failure asks for reconfiguration.
//!
//! Refreshes are serialized, so the poll loop and the debounced refresh requested after a
//! user command never run their command round trips concurrently. Once closed, a refresh
//! that was already queued behind the lock gives up without touching the transport.

use super::gateway::CommandGateway;
use super::scheduler::Refresh;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::device::DeviceSnapshot;
use crate::refresh_span;
use crate::transport::Transport;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Upper bound on a single refresh
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    /// Retry on the next interval
    Failed(String),
    /// The user has to reconfigure the device
    AuthFailed(String),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Updated)
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Updated => write!(f, "updated"),
            RefreshOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            RefreshOutcome::AuthFailed(reason) => write!(f, "authentication failed: {reason}"),
        }
    }
}

pub struct UpdateCoordinator<T: Transport + 'static> {
    gateway: Arc<CommandGateway<T>>,
    update_interval: Duration,
    refresh_timeout: Duration,
    refresh_lock: Mutex<()>,
    last_update_success: AtomicBool,
    closed: AtomicBool,
    data: watch::Sender<Option<DeviceSnapshot>>,
    poll_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> UpdateCoordinator<T> {
    pub fn new(gateway: Arc<CommandGateway<T>>, update_interval: Duration) -> Self {
        let (data, _) = watch::channel(None);
        Self {
            gateway,
            update_interval,
            refresh_timeout: REFRESH_TIMEOUT,
            refresh_lock: Mutex::new(()),
            last_update_success: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            data,
            poll_handle: StdMutex::new(None),
        }
    }

    pub fn with_refresh_timeout(mut self, refresh_timeout: Duration) -> Self {
        self.refresh_timeout = refresh_timeout;
        self
    }

    pub fn gateway(&self) -> &Arc<CommandGateway<T>> {
        &self.gateway
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Result of the most recent refresh, false before the first one
    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    /// Snapshot published by the last successful refresh
    pub fn data(&self) -> Option<DeviceSnapshot> {
        self.data.borrow().clone()
    }

    /// Observe snapshots as refreshes publish them
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceSnapshot>> {
        self.data.subscribe()
    }

    /// Initial refresh at session start; any failure is returned to the caller
    pub async fn first_refresh(&self) -> BridgeResult<()> {
        let result = self.attempt("first").await;
        if let Err(e) = &result {
            warn!(device_id = %self.gateway.device_id(), error = %e, "First refresh failed");
        }
        result
    }

    /// Run one refresh and classify its outcome
    pub async fn refresh_now(&self, trigger: &str) -> RefreshOutcome {
        match self.attempt(trigger).await {
            Ok(()) => RefreshOutcome::Updated,
            Err(e) if self.is_closed() => {
                debug!(trigger, error = %e, "Refresh dropped after close");
                RefreshOutcome::Failed(e.to_string())
            }
            Err(e) if e.is_authentication() => {
                warn!(device_id = %self.gateway.device_id(), error = %e, "Reconfiguration required");
                RefreshOutcome::AuthFailed(e.to_string())
            }
            Err(e) => {
                warn!(
                    device_id = %self.gateway.device_id(),
                    trigger,
                    error = %e,
                    "Refresh failed, retrying next interval"
                );
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    async fn attempt(&self, trigger: &str) -> BridgeResult<()> {
        let _serialized = self.refresh_lock.lock().await;
        if self.is_closed() {
            return Err(BridgeError::general("Coordinator is closed"));
        }
        let span = refresh_span!(device_id = %self.gateway.device_id(), trigger = %trigger);

        let result = async {
            match tokio::time::timeout(self.refresh_timeout, self.gateway.load_initial_data()).await
            {
                Ok(result) => result,
                Err(_) => Err(BridgeError::communication(format!(
                    "Refresh did not finish within {:?}",
                    self.refresh_timeout
                ))),
            }
        }
        .instrument(span)
        .await;

        self.last_update_success
            .store(result.is_ok(), Ordering::SeqCst);
        if result.is_ok() {
            debug!(trigger, "Refresh complete");
            self.data.send_replace(self.gateway.current_snapshot());
        }
        result
    }

    /// Start the fixed-interval poll loop; a running loop is replaced
    ///
    /// The loop holds only a weak reference and ends once the coordinator is dropped.
    pub fn start_polling(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.update_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // First tick completes immediately, skip it

            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.refresh_now("poll").await;
            }
        });

        if let Some(previous) = self.poll_slot().replace(handle) {
            previous.abort();
        }
        info!(device_id = %self.gateway.device_id(), ?interval, "Polling started");
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.poll_slot().take() {
            handle.abort();
            info!(device_id = %self.gateway.device_id(), "Polling stopped");
        }
    }

    /// Stop polling and refuse every later refresh, including ones already waiting
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_polling();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until no refresh holds the lock
    pub async fn wait_idle(&self) {
        let _idle = self.refresh_lock.lock().await;
    }

    pub fn is_polling(&self) -> bool {
        self.poll_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn poll_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poll_handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<T: Transport + 'static> Refresh for UpdateCoordinator<T> {
    async fn refresh(&self) {
        self.refresh_now("debounced").await;
    }
}

impl<T: Transport + 'static> Drop for UpdateCoordinator<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.poll_slot().take() {
            handle.abort();
        }
    }
}
