//! Testing utilities and mock implementations
//!
//! Lets the command path be exercised without a broker or a shower.

pub mod mocks;

pub use mocks::*;
