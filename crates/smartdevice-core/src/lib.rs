//! Core types for the smartdevice framework.
//!
//! Shared by the command layer and the protocol session:
//! - [`Value`] and the [`TargetType`] catalogue
//! - the [`SendData`] payload envelope
//! - configuration defaults and tracing setup

pub mod config;
pub mod envelope;
pub mod logging;
pub mod value;

pub use envelope::SendData;
pub use value::{TargetType, UnknownTargetType, Value};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
