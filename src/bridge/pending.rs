//! Pending-call registry
//!
//! The shower's protocol carries no request identifier, so replies are matched to
//! outstanding calls by registration order: every inbound reply resolves the most
//! recently registered call that is still waiting. Registration happens on the caller's
//! task and resolution on the transport's receive task; both go through one mutex that
//! is never held across an await, and the value itself crosses over a `oneshot` channel.
//!
//! A call that times out, is dropped, or is cancelled is removed from the registry
//! under the same lock, so a later reply can never resolve it.

use crate::protocol::messages::{InboundMessage, MessageType};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lifecycle of a [`PendingCall`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    Resolved,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Error, PartialEq)]
pub enum PendingCallError {
    #[error("No reply received within {0:?}")]
    TimedOut(Duration),
    #[error("Pending call was cancelled")]
    Cancelled,
    #[error("Pending call already finished as {0:?}")]
    AlreadyFinished(CallState),
}

struct Entry {
    id: u64,
    expected: MessageType,
    reply_tx: oneshot::Sender<InboundMessage>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    stack: Vec<Entry>,
}

fn lock(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_entry(inner: &Mutex<RegistryInner>, id: u64) -> bool {
    let mut guard = lock(inner);
    match guard.stack.iter().position(|entry| entry.id == id) {
        Some(index) => {
            guard.stack.remove(index);
            true
        }
        None => false,
    }
}

/// Ordered collection of calls awaiting a reply
#[derive(Clone, Default)]
pub struct PendingCallRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl PendingCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new call; `expected` is the reply kind the command normally gets
    pub fn register(&self, expected: MessageType) -> PendingCall {
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut guard = lock(&self.inner);
        guard.next_id += 1;
        let id = guard.next_id;
        guard.stack.push(Entry {
            id,
            expected,
            reply_tx,
        });
        debug!(call_id = id, expected = %expected, pending = guard.stack.len(), "Registered pending call");

        PendingCall {
            id,
            expected,
            state: CallState::Pending,
            reply_rx,
            registry: self.inner.clone(),
        }
    }

    /// Resolve the most recently registered call with `reply`
    ///
    /// Returns the id of the resolved call, or None when nothing was waiting.
    pub fn resolve_one(&self, reply: InboundMessage) -> Option<u64> {
        let mut reply = reply;
        let mut guard = lock(&self.inner);

        // Sending under the lock keeps resolve and timeout-removal mutually exclusive
        while let Some(entry) = guard.stack.pop() {
            if entry.expected != reply.kind {
                warn!(
                    call_id = entry.id,
                    expected = %entry.expected,
                    received = %reply.kind,
                    "Reply type differs from the pending call's expected type"
                );
            }
            match entry.reply_tx.send(reply) {
                Ok(()) => {
                    debug!(call_id = entry.id, "Resolved pending call");
                    return Some(entry.id);
                }
                Err(returned) => reply = returned,
            }
        }

        debug!(kind = %reply.kind, "Inbound message with no pending call");
        None
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner).stack.len()
    }

    /// Drop every outstanding call; their waiters observe `Cancelled`
    pub fn cancel_all(&self) -> usize {
        let mut guard = lock(&self.inner);
        let cancelled = guard.stack.len();
        guard.stack.clear();
        if cancelled > 0 {
            debug!(cancelled, "Cancelled pending calls");
        }
        cancelled
    }
}

/// Handle to one in-flight request
///
/// Dropping a call that is still pending removes it from the registry.
pub struct PendingCall {
    id: u64,
    expected: MessageType,
    state: CallState,
    reply_rx: oneshot::Receiver<InboundMessage>,
    registry: Arc<Mutex<RegistryInner>>,
}

impl PendingCall {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn expected(&self) -> MessageType {
        self.expected
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Wait for the reply for at most `timeout`
    pub async fn wait(&mut self, timeout: Duration) -> Result<InboundMessage, PendingCallError> {
        if self.state != CallState::Pending {
            return Err(PendingCallError::AlreadyFinished(self.state));
        }

        match tokio::time::timeout(timeout, &mut self.reply_rx).await {
            Ok(Ok(reply)) => {
                self.state = CallState::Resolved;
                Ok(reply)
            }
            Ok(Err(_)) => {
                self.state = CallState::Cancelled;
                Err(PendingCallError::Cancelled)
            }
            Err(_) => {
                if remove_entry(&self.registry, self.id) {
                    self.state = CallState::TimedOut;
                    debug!(call_id = self.id, "Pending call timed out");
                    return Err(PendingCallError::TimedOut(timeout));
                }
                // Popped by a reply right at the deadline; the value is already in the channel
                match self.reply_rx.try_recv() {
                    Ok(reply) => {
                        self.state = CallState::Resolved;
                        Ok(reply)
                    }
                    Err(_) => {
                        self.state = CallState::Cancelled;
                        Err(PendingCallError::Cancelled)
                    }
                }
            }
        }
    }

    /// Withdraw the call without waiting
    pub fn cancel(&mut self) {
        if self.state == CallState::Pending {
            remove_entry(&self.registry, self.id);
            self.state = CallState::Cancelled;
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.state == CallState::Pending {
            remove_entry(&self.registry, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(value: serde_json::Value) -> InboundMessage {
        InboundMessage::from_value(value).unwrap()
    }

    fn status_reply() -> InboundMessage {
        reply(json!({"Type": "Status", "St": "STOP"}))
    }

    #[tokio::test]
    async fn test_resolve_single_call() {
        let registry = PendingCallRegistry::new();
        let mut call = registry.register(MessageType::Status);
        assert_eq!(registry.pending_count(), 1);

        assert_eq!(registry.resolve_one(status_reply()), Some(call.id()));
        assert_eq!(registry.pending_count(), 0);

        let value = call.wait(Duration::from_millis(50)).await.unwrap();
        assert_eq!(value.kind, MessageType::Status);
        assert_eq!(call.state(), CallState::Resolved);
    }

    #[tokio::test]
    async fn test_resolution_is_last_in_first_out() {
        let registry = PendingCallRegistry::new();
        let mut first = registry.register(MessageType::Status);
        let mut second = registry.register(MessageType::Chars);

        assert_eq!(registry.resolve_one(reply(json!({"Type": "Chars"}))), Some(second.id()));
        assert_eq!(registry.pending_count(), 1);
        assert_eq!(
            second.wait(Duration::from_millis(50)).await.unwrap().kind,
            MessageType::Chars
        );

        assert_eq!(registry.resolve_one(status_reply()), Some(first.id()));
        assert!(first.wait(Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_mismatched_reply_type_still_resolves() {
        let registry = PendingCallRegistry::new();
        let mut call = registry.register(MessageType::Status);

        assert!(registry.resolve_one(reply(json!({"Type": "Chars"}))).is_some());
        let value = call.wait(Duration::from_millis(50)).await.unwrap();
        assert_eq!(value.kind, MessageType::Chars);
    }

    #[test]
    fn test_resolve_with_nothing_pending_is_noop() {
        let registry = PendingCallRegistry::new();
        assert_eq!(registry.resolve_one(status_reply()), None);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let registry = PendingCallRegistry::new();
        let mut call = registry.register(MessageType::Chars);

        let result = call.wait(Duration::from_millis(20)).await;
        assert_eq!(
            result.unwrap_err(),
            PendingCallError::TimedOut(Duration::from_millis(20))
        );
        assert_eq!(call.state(), CallState::TimedOut);
        assert_eq!(registry.pending_count(), 0);

        // A late reply finds nothing to resolve
        assert_eq!(registry.resolve_one(status_reply()), None);
        assert_eq!(
            call.wait(Duration::from_millis(20)).await.unwrap_err(),
            PendingCallError::AlreadyFinished(CallState::TimedOut)
        );
    }

    #[tokio::test]
    async fn test_late_reply_resolves_next_call_not_timed_out_one() {
        let registry = PendingCallRegistry::new();
        let mut stale = registry.register(MessageType::Chars);
        assert!(stale.wait(Duration::from_millis(10)).await.is_err());

        let mut fresh = registry.register(MessageType::Status);
        assert_eq!(registry.resolve_one(status_reply()), Some(fresh.id()));
        assert!(fresh.wait(Duration::from_millis(10)).await.is_ok());
    }

    #[test]
    fn test_drop_and_cancel_remove_entries() {
        let registry = PendingCallRegistry::new();
        let dropped = registry.register(MessageType::Status);
        let mut cancelled = registry.register(MessageType::Status);
        assert_eq!(registry.pending_count(), 2);

        drop(dropped);
        assert_eq!(registry.pending_count(), 1);

        cancelled.cancel();
        assert_eq!(cancelled.state(), CallState::Cancelled);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_wakes_waiters() {
        let registry = PendingCallRegistry::new();
        let mut call = registry.register(MessageType::Status);

        assert_eq!(registry.cancel_all(), 1);
        assert_eq!(
            call.wait(Duration::from_secs(1)).await.unwrap_err(),
            PendingCallError::Cancelled
        );
        assert_eq!(call.state(), CallState::Cancelled);
    }

    #[tokio::test]
    async fn test_resolution_from_another_task() {
        let registry = PendingCallRegistry::new();
        let mut call = registry.register(MessageType::Status);

        let resolver = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve_one(status_reply());
        });

        let value = call.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(value.fields["St"], json!("STOP"));
        assert_eq!(registry.pending_count(), 0);
    }
}
