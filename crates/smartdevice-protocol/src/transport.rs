//! Transport seam for the protocol session.
//!
//! Socket and HTTP connections live in the host; the session only needs a
//! way to hand off one serialized message.

use tokio::sync::mpsc;

use crate::error::{Result, SessionError};

/// Outbound side of a persistent connection.
pub trait RpcTransport: Send + Sync {
    /// Hand one serialized message to the connection.
    ///
    /// Must not block waiting for a reply, and must not call back into the
    /// session from inside this call. Replies arrive through
    /// [`crate::ProtocolSession::data_received`].
    fn send_message(&self, message: &str) -> Result<()>;

    fn is_connected(&self) -> bool {
        true
    }
}

/// Transport that forwards messages into a tokio channel.
///
/// The receiving task owns the actual socket.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RpcTransport for ChannelTransport {
    fn send_message(&self, message: &str) -> Result<()> {
        self.tx
            .send(message.to_string())
            .map_err(|_| SessionError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_transport() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send_message("hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");

        drop(rx);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send_message("lost").unwrap_err(),
            SessionError::Disconnected
        ));
    }
}
