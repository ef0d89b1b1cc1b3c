//! JSON-RPC protocol session.
//!
//! Tracks every request by message id until its reply arrives. Requests that
//! stay unanswered longer than the configured timeout are resent with the
//! same id, and dropped once the resend budget is spent. The staleness sweep
//! runs opportunistically on inbound data, or periodically from
//! [`ProtocolSession::spawn_watchdog`] for links that go quiet.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use smartdevice_core::config::{defaults, env_vars};
use smartdevice_core::{SendData, Value};
use tokio::sync::mpsc;

use crate::error::{Result, SessionError};
use crate::message::{parse_incoming, IncomingMessage, RpcRequest};
use crate::pending::PendingRequest;
use crate::transport::RpcTransport;

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Reply timeout in milliseconds
    pub timeout_ms: u64,
    /// Resends before a request is dropped
    pub max_repeats: u32,
    /// Minimum interval between two sweeps triggered by inbound data
    pub stale_check_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::MESSAGE_TIMEOUT_MS,
            max_repeats: defaults::MESSAGE_REPEAT,
            stale_check_interval_ms: defaults::STALE_CHECK_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Configuration from `SMARTDEVICE_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            timeout_ms: env_vars::message_timeout_ms(),
            max_repeats: env_vars::message_repeat(),
            stale_check_interval_ms: env_vars::stale_check_interval_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::milliseconds(self.timeout_ms as i64)
    }

    pub fn stale_check_interval(&self) -> Duration {
        Duration::milliseconds(self.stale_check_interval_ms as i64)
    }
}

/// Events surfaced to the device layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcEvent {
    /// Reply to a tracked request
    Reply {
        id: u64,
        method: String,
        params: Value,
        result: Value,
    },
    /// Error reply; `method` is known when the id matched a tracked request
    Error {
        id: Option<u64>,
        method: Option<String>,
        code: i64,
        message: String,
    },
    /// Unsolicited notification
    Notification { method: String, params: Value },
}

/// Receiver of session events.
pub type EventCallback = Arc<dyn Fn(RpcEvent) + Send + Sync>;

/// Outcome of one staleness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub resent: usize,
    pub dropped: usize,
    /// Another sweep was already running
    pub skipped: bool,
}

#[derive(Debug)]
struct Outbound {
    id: u64,
    method: String,
    params: Option<JsonValue>,
    repeat: u32,
    /// Retransmission of a tracked request; updates its entry in place
    resend: bool,
}

/// One JSON-RPC session over a persistent connection.
pub struct ProtocolSession {
    config: SessionConfig,
    transport: Arc<dyn RpcTransport>,
    callback: Option<EventCallback>,
    /// Next message id
    message_id: Mutex<u64>,
    queue_tx: mpsc::UnboundedSender<Outbound>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Outbound>>,
    pending: DashMap<u64, PendingRequest>,
    sweep_lock: Mutex<()>,
    last_check: Mutex<DateTime<Utc>>,
}

impl ProtocolSession {
    pub fn new(config: SessionConfig, transport: Arc<dyn RpcTransport>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            callback: None,
            message_id: Mutex::new(1),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            pending: DashMap::new(),
            sweep_lock: Mutex::new(()),
            last_check: Mutex::new(Utc::now()),
        }
    }

    pub fn with_callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Allocate the next message id.
    pub fn next_message_id(&self) -> u64 {
        let mut guard = self.message_id.lock();
        let id = *guard;
        *guard += 1;
        id
    }

    /// Send a command envelope built by the registry.
    ///
    /// Fire-and-forget: the reply surfaces through the event callback.
    pub fn send(&self, data: &SendData) -> Result<u64> {
        let method = data.method().ok_or(SessionError::MissingMethod)?;
        let params = data
            .rpc_params()
            .filter(|p| !p.is_null())
            .map(|p| JsonValue::from(p.clone()));
        self.send_rpc_message(method, params, None, 0)
    }

    /// Queue a request and drain the queue.
    ///
    /// `id = None` allocates a fresh id; resends pass the original id and an
    /// incremented `repeat`.
    pub fn send_rpc_message(
        &self,
        method: &str,
        params: Option<JsonValue>,
        id: Option<u64>,
        repeat: u32,
    ) -> Result<u64> {
        let id = id.unwrap_or_else(|| self.next_message_id());
        self.enqueue(
            Outbound {
                id,
                method: method.to_string(),
                params,
                repeat,
                resend: false,
            },
            Utc::now(),
        )?;
        Ok(id)
    }

    fn enqueue(&self, msg: Outbound, now: DateTime<Utc>) -> Result<()> {
        self.queue_tx
            .send(msg)
            .map_err(|_| SessionError::Disconnected)?;
        self.drain_queue(now);
        Ok(())
    }

    /// Transmit everything queued, recording each message as pending.
    fn drain_queue(&self, now: DateTime<Utc>) {
        let mut rx = self.queue_rx.lock();
        while let Ok(msg) = rx.try_recv() {
            let request = RpcRequest::new(msg.id, msg.method.clone(), msg.params.clone());
            let text = match request.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Cannot serialize request {} ({}): {}", msg.id, msg.method, e);
                    continue;
                }
            };

            // Recorded before transmission so a fast reply always finds it
            if msg.resend {
                match self.pending.get_mut(&msg.id) {
                    Some(mut entry) => {
                        entry.repeat = msg.repeat;
                        entry.sent_at = now;
                    }
                    None => {
                        tracing::debug!("Message {} answered before resend, skipping", msg.id);
                        continue;
                    }
                }
            } else {
                self.pending.insert(
                    msg.id,
                    PendingRequest::new(msg.id, msg.method, msg.params, msg.repeat, now),
                );
            }

            tracing::debug!("Sending JSON-RPC message: {}", text);
            if let Err(e) = self.transport.send_message(&text) {
                tracing::warn!("Transport failed for message {}: {}", msg.id, e);
            }
        }
    }

    /// Handle one inbound frame from the transport.
    pub fn data_received(&self, raw: &str) -> Result<()> {
        let result = parse_incoming(raw).map(|messages| {
            for message in messages {
                self.dispatch(message);
            }
        });
        if let Err(e) = &result {
            tracing::warn!("Discarding inbound data '{}': {}", raw, e);
        }

        self.maybe_check_stale(Utc::now());
        result
    }

    fn dispatch(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::Response { id, result } => match self.pending.remove(&id) {
                Some((_, request)) => {
                    tracing::debug!("Reply for message {} ({})", id, request.method);
                    self.emit(RpcEvent::Reply {
                        id,
                        method: request.method,
                        params: request.params.map(Value::from).unwrap_or_default(),
                        result: result.into(),
                    });
                }
                None => tracing::warn!("Reply for unknown message id {}", id),
            },
            IncomingMessage::Error { id, error } => {
                let method = id
                    .and_then(|id| self.pending.remove(&id))
                    .map(|(_, request)| request.method);
                tracing::warn!(
                    "Error reply for message {:?} ({:?}): {} {}",
                    id,
                    method,
                    error.code,
                    error.message
                );
                self.emit(RpcEvent::Error {
                    id,
                    method,
                    code: error.code,
                    message: error.message,
                });
            }
            IncomingMessage::Notification { method, params } => {
                tracing::debug!("Notification {}", method);
                self.emit(RpcEvent::Notification {
                    method,
                    params: params.into(),
                });
            }
        }
    }

    fn emit(&self, event: RpcEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    fn maybe_check_stale(&self, now: DateTime<Utc>) {
        {
            let mut last = self.last_check.lock();
            if now - *last < self.config.stale_check_interval() {
                return;
            }
            *last = now;
        }
        self.check_stale_at(now);
    }

    /// Run a staleness sweep now.
    pub fn check_stale(&self) -> SweepStats {
        self.check_stale_at(Utc::now())
    }

    /// Run a staleness sweep as of `now`.
    ///
    /// Skipped when another sweep holds the lock. Works on a snapshot of the
    /// pending table so replies can be processed concurrently.
    pub fn check_stale_at(&self, now: DateTime<Utc>) -> SweepStats {
        let Some(_guard) = self.sweep_lock.try_lock() else {
            tracing::debug!("Staleness sweep already running, skipping");
            return SweepStats {
                skipped: true,
                ..SweepStats::default()
            };
        };

        let timeout = self.config.timeout();
        let snapshot: Vec<PendingRequest> =
            self.pending.iter().map(|entry| entry.value().clone()).collect();

        let mut stats = SweepStats::default();
        for request in snapshot {
            if !request.is_stale(now, timeout) {
                continue;
            }

            if request.can_retry(self.config.max_repeats) {
                tracing::info!(
                    "No reply for message {} ({}) after {} ms, resending ({}/{})",
                    request.id,
                    request.method,
                    request.elapsed(now).num_milliseconds(),
                    request.repeat + 1,
                    self.config.max_repeats
                );
                let id = request.id;
                let resend = Outbound {
                    id,
                    method: request.method,
                    params: request.params,
                    repeat: request.repeat + 1,
                    resend: true,
                };
                match self.enqueue(resend, now) {
                    Ok(()) if self.pending.contains_key(&id) => stats.resent += 1,
                    Ok(()) => {}
                    Err(e) => tracing::error!("Resend of message {} failed: {}", id, e),
                }
            } else if self
                .pending
                .remove_if(&request.id, |_, current| current.repeat == request.repeat)
                .is_some()
            {
                tracing::error!(
                    "Giving up on message {} ({}) after {} resends",
                    request.id,
                    request.method,
                    request.repeat
                );
                stats.dropped += 1;
            }
        }
        stats
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_request(&self, id: u64) -> Option<PendingRequest> {
        self.pending.get(&id).map(|entry| entry.value().clone())
    }

    /// Ids awaiting a reply, ascending.
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Discard queued messages that were not transmitted yet.
    pub fn clear_queue(&self) -> usize {
        let mut rx = self.queue_rx.lock();
        let mut cleared = 0;
        while rx.try_recv().is_ok() {
            cleared += 1;
        }
        cleared
    }

    /// Forget all in-flight requests.
    pub fn clear_pending(&self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        cleared
    }

    /// Discard queue and in-flight requests, e.g. after a reconnect.
    pub fn flush(&self) {
        let queued = self.clear_queue();
        let pending = self.clear_pending();
        tracing::info!("Flushed {} queued and {} pending messages", queued, pending);
    }

    /// Spawn a task that sweeps stale requests periodically.
    ///
    /// The task ends once the session is dropped.
    pub fn spawn_watchdog(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let session: Weak<Self> = Arc::downgrade(self);
        let period = std::time::Duration::from_millis(self.config.stale_check_interval_ms.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(session) = session.upgrade() else {
                    tracing::debug!("Session dropped, stopping watchdog");
                    break;
                };
                let stats = session.check_stale();
                if stats.resent > 0 || stats.dropped > 0 {
                    tracing::debug!(
                        "Watchdog sweep: {} resent, {} dropped",
                        stats.resent,
                        stats.dropped
                    );
                }
            }
        })
    }
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    fn session() -> (ProtocolSession, mpsc::UnboundedReceiver<String>) {
        let (transport, rx) = ChannelTransport::new();
        let config = SessionConfig {
            timeout_ms: 1000,
            max_repeats: 2,
            stale_check_interval_ms: 100,
        };
        (ProtocolSession::new(config, Arc::new(transport)), rx)
    }

    #[test]
    fn test_ids_start_at_one() {
        let (session, _rx) = session();
        assert_eq!(session.next_message_id(), 1);
        assert_eq!(session.next_message_id(), 2);
    }

    #[test]
    fn test_send_records_pending() {
        let (session, mut rx) = session();
        let id = session
            .send_rpc_message("Player.Stop", Some(serde_json::json!({"playerid": 1})), None, 0)
            .unwrap();

        let wire: JsonValue = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(wire["id"], 1);
        assert_eq!(wire["method"], "Player.Stop");
        assert_eq!(session.pending_ids(), vec![id]);
    }

    #[test]
    fn test_send_envelope_without_method() {
        let (session, _rx) = session();
        assert!(matches!(
            session.send(&SendData::new("PW?")).unwrap_err(),
            SessionError::MissingMethod
        ));
    }

    #[test]
    fn test_sweep_skipped_when_busy() {
        let (session, _rx) = session();
        let _guard = session.sweep_lock.lock();
        assert!(session.check_stale().skipped);
    }

    #[test]
    fn test_resend_of_answered_request_is_dropped() {
        let (session, mut rx) = session();
        let id = session.send_rpc_message("Player.Stop", None, None, 0).unwrap();
        rx.try_recv().unwrap();

        // reply handled between the sweep's snapshot and its resend
        session.dispatch(IncomingMessage::Response {
            id,
            result: JsonValue::Null,
        });
        session
            .enqueue(
                Outbound {
                    id,
                    method: "Player.Stop".to_string(),
                    params: None,
                    repeat: 1,
                    resend: true,
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(session.pending_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_resend_updates_entry_in_place() {
        let (session, mut rx) = session();
        let id = session.send_rpc_message("Player.Stop", None, None, 0).unwrap();
        let sent_at = session.pending_request(id).unwrap().sent_at;
        let later = sent_at + Duration::milliseconds(1500);

        let stats = session.check_stale_at(later);
        assert_eq!(stats.resent, 1);
        let entry = session.pending_request(id).unwrap();
        assert_eq!((entry.repeat, entry.sent_at), (1, later));

        let frames: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_clear_queue_and_flush() {
        let (session, _rx) = session();
        session
            .queue_tx
            .send(Outbound {
                id: 99,
                method: "JSONRPC.Ping".to_string(),
                params: None,
                repeat: 0,
                resend: false,
            })
            .unwrap();
        session.send_rpc_message("JSONRPC.Ping", None, None, 0).unwrap();
        assert_eq!(session.pending_count(), 2);

        assert_eq!(session.clear_queue(), 0);
        session.flush();
        assert_eq!(session.pending_count(), 0);
    }
}
