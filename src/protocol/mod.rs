//! Wire protocol of the Zagonel shower
//!
//! Device record types, inbound/outbound message shapes and topic naming.

pub mod device;
pub mod messages;
pub mod topics;

pub use device::*;
pub use messages::*;
pub use topics::*;
