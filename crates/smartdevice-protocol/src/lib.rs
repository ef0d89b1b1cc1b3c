//! JSON-RPC protocol layer for smartdevice plugins.
//!
//! Provides:
//! - JSON-RPC 2.0 request and reply framing
//! - Pending request tracking with resend on timeout
//! - The protocol session and its transport seam

pub mod error;
pub mod message;
pub mod pending;
pub mod session;
pub mod transport;

// Re-exports
pub use error::{Result, SessionError};

pub use message::{parse_incoming, IncomingMessage, RpcErrorObject, RpcRequest};

pub use pending::PendingRequest;

pub use session::{EventCallback, ProtocolSession, RpcEvent, SessionConfig, SweepStats};

pub use transport::{ChannelTransport, RpcTransport};
