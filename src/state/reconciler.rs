//! Device state reconciliation
//!
//! Folds inbound Chars/Status payloads into one [`DeviceSnapshot`]. The snapshot lives
//! in a `watch` channel: each inbound message is applied inside a single `send_modify`
//! call, so a reader on the caller side sees either the state before the message or the
//! state after it, never a half-applied record.
//!
//! Merge rules for a payload of kind `T`:
//! 1. no snapshot yet: create one holding only the `T` record built from the payload
//! 2. snapshot without a `T` record: build the record fresh from the payload
//! 3. otherwise overwrite exactly the fields the payload carries
//!
//! Omitted fields are never cleared. Unknown keys and undecodable values are skipped.

use crate::protocol::device::{
    DeviceCharacteristics, DeviceSnapshot, DeviceStatus, FieldUpdate, WireRecord,
};
use crate::protocol::messages::{InboundMessage, MessageType};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info};

/// Summary of one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub kind: MessageType,
    /// The snapshot itself did not exist before this message
    pub created_snapshot: bool,
    /// The record of this kind did not exist before this message
    pub created_record: bool,
    /// Number of fields written
    pub applied: usize,
    /// Keys that were unknown or carried undecodable values
    pub ignored: Vec<String>,
}

/// Owner of the authoritative device snapshot
#[derive(Debug)]
pub struct StateReconciler {
    state: watch::Sender<Option<DeviceSnapshot>>,
}

impl StateReconciler {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    /// Apply one inbound message to the snapshot as a single atomic update
    pub fn apply(&self, message: &InboundMessage) -> MergeReport {
        let mut report = MergeReport {
            kind: message.kind,
            created_snapshot: false,
            created_record: false,
            applied: 0,
            ignored: Vec::new(),
        };

        self.state.send_modify(|state| {
            report.created_snapshot = state.is_none();
            let snapshot = state.get_or_insert_with(DeviceSnapshot::default);

            match message.kind {
                MessageType::Chars => {
                    merge_record::<DeviceCharacteristics>(
                        &mut snapshot.characteristics,
                        &message.fields,
                        &mut report,
                    );
                }
                MessageType::Status => {
                    merge_record::<DeviceStatus>(&mut snapshot.status, &message.fields, &mut report);
                }
            }
        });

        if report.created_snapshot {
            info!(kind = %report.kind, "Device snapshot created from first message");
        }
        if !report.ignored.is_empty() {
            debug!(kind = %report.kind, ignored = ?report.ignored, "Ignored unrecognized fields");
        }
        debug!(
            kind = %report.kind,
            applied = report.applied,
            created_record = report.created_record,
            "Reconciled inbound message"
        );

        report
    }

    /// Consistent copy of the current snapshot
    pub fn snapshot(&self) -> Option<DeviceSnapshot> {
        self.state.borrow().clone()
    }

    /// Receiver notified after every reconciled message
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceSnapshot>> {
        self.state.subscribe()
    }

    /// True iff a status record exists and reports `RUN`
    pub fn is_running(&self) -> bool {
        self.state
            .borrow()
            .as_ref()
            .is_some_and(DeviceSnapshot::is_running)
    }

    /// Drop the snapshot at session teardown
    pub fn clear(&self) {
        self.state.send_replace(None);
    }
}

impl Default for StateReconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_record<R: WireRecord>(
    slot: &mut Option<R>,
    fields: &Map<String, Value>,
    report: &mut MergeReport,
) {
    report.created_record = slot.is_none();
    let record = slot.get_or_insert_with(R::default);

    for (key, value) in fields {
        match record.apply_field(key, value) {
            FieldUpdate::Applied => report.applied += 1,
            FieldUpdate::Malformed | FieldUpdate::Unknown => report.ignored.push(key.clone()),
        }
    }
}
