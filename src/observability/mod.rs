//! Observability: structured logging and span macros

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{command_span, mqtt_span, refresh_span};
