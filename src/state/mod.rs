//! Authoritative device state

pub mod reconciler;

pub use reconciler::{MergeReport, StateReconciler};
