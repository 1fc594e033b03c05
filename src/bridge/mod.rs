//! Request/response layer over the broker
//!
//! - [`pending`]: correlates replies with waiting callers
//! - [`gateway`]: the only way commands reach the device
//! - [`scheduler`]: coalesces refresh requests
//! - [`coordinator`]: fixed-interval poll loop
//! - [`session`]: owns all of the above for one device

pub mod coordinator;
pub mod gateway;
pub mod pending;
pub mod scheduler;
pub mod session;

pub use coordinator::{RefreshOutcome, UpdateCoordinator, REFRESH_TIMEOUT};
pub use gateway::{CommandGateway, InboundRouter};
pub use pending::{CallState, PendingCall, PendingCallError, PendingCallRegistry};
pub use scheduler::{Refresh, RefreshScheduler};
pub use session::{DeviceControl, DeviceSession};
