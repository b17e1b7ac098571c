//! Per-session duplex connection.
//!
//! ```text
//! POST ?sid=..  ──► inbound_tx   ──► inbound_rx   ──► receive()
//! send()        ──► outbound_tx  ──► outbound_rx  ──► GET ?sid=..
//!                       └──── per-message outcome ◄───┘
//! ```
//!
//! Both queues hold a single item, so they behave as hand-off points rather
//! than buffers. Every outbound message carries its own one-shot channel on
//! which the exchange that took it reports the outcome of the HTTP write.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};

use crate::observability::metrics;
use crate::polling::error::{TransportError, TransportResult};
use crate::polling::session::SessionId;
use crate::polling::sink::ResponseSink;
use crate::polling::transport::{Shared, TransportSettings};

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for a connection, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Keepalive settings shared with the client during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Result of writing one outbound message to an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Delivered,
    Failed(String),
}

/// A message waiting for a poll, with the channel its sender listens on.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) payload: String,
    pub(crate) outcome: oneshot::Sender<WriteOutcome>,
}

/// What a waiting poll ended up with.
#[derive(Debug)]
pub(crate) enum Polled {
    Message(Outbound),
    Idle,
    ClientGone,
    Closed,
}

struct Inner {
    id: ConnectionId,
    settings: Arc<TransportSettings>,
    transport: Weak<Shared>,
    session_id: Mutex<Option<SessionId>>,
    closed: watch::Sender<bool>,

    inbound_tx: mpsc::Sender<String>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,

    outbound_tx: mpsc::Sender<Outbound>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<Outbound>>,
}

/// One logical duplex stream to a polling client.
///
/// Cheap to clone; clones share the same queues. At most one `receive`, one
/// `send` and one poll are expected in flight at a time.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub(crate) fn new(transport: &Arc<Shared>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        let (closed, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                id: ConnectionId::next(),
                settings: Arc::clone(&transport.settings),
                transport: Arc::downgrade(transport),
                session_id: Mutex::new(None),
                closed,
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
                outbound_tx,
                outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// The session this connection is bound to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether both handles refer to the same connection.
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Keepalive configuration of the owning transport.
    pub fn ping_policy(&self) -> PingPolicy {
        PingPolicy {
            interval: self.inner.settings.ping_interval,
            timeout: self.inner.settings.ping_timeout,
        }
    }

    /// Record the session id this connection answers to.
    pub(crate) fn claim_session(&self, id: &SessionId) -> TransportResult<()> {
        let mut slot = self
            .inner
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match slot.as_ref() {
            Some(bound) if bound == id => Ok(()),
            Some(bound) => Err(TransportError::ConnectionAlreadyBound(bound.clone())),
            None => {
                *slot = Some(id.clone());
                Ok(())
            }
        }
    }

    /// Wait for the next message posted by the client.
    ///
    /// Fails with [`TransportError::Timeout`] once the receive timeout elapses.
    pub async fn receive(&self) -> TransportResult<String> {
        let timeout = self.inner.settings.receive_timeout;
        let take = async { self.inner.inbound_rx.lock().await.recv().await };

        let result = tokio::select! {
            biased;
            _ = self.wait_closed() => Err(TransportError::Closed),
            res = tokio::time::timeout(timeout, take) => match res {
                Ok(Some(message)) => Ok(message),
                Ok(None) => Err(TransportError::Closed),
                Err(_) => Err(TransportError::Timeout(timeout)),
            },
        };

        metrics::record_receive(outcome_label(&result));
        result
    }

    /// Queue a message for the next poll and wait until it has been written.
    ///
    /// Succeeds only once a poll has taken the message and written it to its
    /// response. The send timeout bounds queueing and delivery together.
    pub async fn send(&self, message: impl Into<String>) -> TransportResult<()> {
        let timeout = self.inner.settings.send_timeout;
        let started = Instant::now();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let item = Outbound {
            payload: message.into(),
            outcome: outcome_tx,
        };

        let deliver = async {
            self.inner
                .outbound_tx
                .send(item)
                .await
                .map_err(|_| TransportError::Closed)?;

            match outcome_rx.await {
                Ok(WriteOutcome::Delivered) => Ok(()),
                Ok(WriteOutcome::Failed(reason)) => Err(TransportError::DeliveryFailed(reason)),
                Err(_) => Err(TransportError::DeliveryFailed(
                    "poll ended without reporting an outcome".to_string(),
                )),
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.wait_closed() => Err(TransportError::Closed),
            res = tokio::time::timeout(timeout, deliver) => {
                res.unwrap_or_else(|_| Err(TransportError::Timeout(timeout)))
            }
        };

        metrics::record_send(outcome_label(&result), started.elapsed());
        if let Err(e) = &result {
            tracing::debug!(connection_id = %self.inner.id, error = %e, "Send failed");
        }
        result
    }

    /// Close the connection.
    ///
    /// Pending and future `receive`, `send` and polls fail with
    /// [`TransportError::Closed`], and the session is removed from the
    /// registry. Closing twice is harmless.
    pub fn close(&self) {
        if self.inner.closed.send_replace(true) {
            return;
        }

        let released = self.inner.transport.upgrade().and_then(|transport| {
            let released = transport.sessions.release(self);
            metrics::set_active_sessions(transport.sessions.len());
            released
        });

        tracing::debug!(
            connection_id = %self.inner.id,
            session_id = ?released.as_ref().map(SessionId::as_str),
            "Connection closed"
        );
    }

    /// Hand a client message to `receive`, waiting at most the inbound timeout.
    pub(crate) async fn forward_inbound(&self, payload: String) -> TransportResult<()> {
        let timeout = self.inner.settings.inbound_timeout;

        let result = tokio::select! {
            biased;
            _ = self.wait_closed() => Err(TransportError::Closed),
            res = tokio::time::timeout(timeout, self.inner.inbound_tx.send(payload)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(TransportError::Closed),
                Err(_) => Err(TransportError::Busy(timeout)),
            },
        };

        metrics::record_forward(outcome_label(&result));
        result
    }

    /// Wait for an outbound message on behalf of a poll.
    ///
    /// Messages whose sender already gave up are discarded rather than
    /// delivered. A message that is ready wins over a client that has left.
    pub(crate) async fn next_outbound(&self, wait: Duration, sink: &mut ResponseSink) -> Polled {
        let take = async {
            let mut outbound = self.inner.outbound_rx.lock().await;
            loop {
                match outbound.recv().await {
                    Some(item) if item.outcome.is_closed() => {
                        tracing::debug!(
                            connection_id = %self.inner.id,
                            "Discarding message abandoned by its sender"
                        );
                    }
                    other => return other,
                }
            }
        };

        tokio::select! {
            biased;
            _ = self.wait_closed() => Polled::Closed,
            item = take => match item {
                Some(item) => Polled::Message(item),
                None => Polled::Closed,
            },
            _ = sink.closed() => Polled::ClientGone,
            _ = tokio::time::sleep(wait) => Polled::Idle,
        }
    }

    async fn wait_closed(&self) {
        let mut closed = self.inner.closed.subscribe();
        loop {
            if *closed.borrow_and_update() {
                return;
            }
            if closed.changed().await.is_err() {
                return;
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("session_id", &self.session_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn outcome_label<T>(result: &TransportResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::polling::sink::ResponseSink;
    use crate::polling::Transport;

    fn transport(ping_ms: u64, io_ms: u64) -> Transport {
        let config = TransportConfig {
            ping_interval_ms: ping_ms / 2 + 1,
            ping_timeout_ms: ping_ms,
            receive_timeout_ms: io_ms,
            send_timeout_ms: io_ms,
            inbound_timeout_ms: io_ms,
            ..TransportConfig::default()
        };
        Transport::new(&config).unwrap()
    }

    #[test]
    fn connection_ids_are_unique() {
        let transport = Transport::default();
        let a = transport.create_connection();
        let b = transport.create_connection();
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("conn-"));
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
    }

    #[test]
    fn ping_policy_reflects_transport() {
        let conn = transport(100, 500).create_connection();
        assert_eq!(
            conn.ping_policy(),
            PingPolicy {
                interval: Duration::from_millis(51),
                timeout: Duration::from_millis(100),
            }
        );
    }

    #[tokio::test]
    async fn receive_times_out() {
        let conn = transport(100, 30).create_connection();
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn receive_gets_forwarded_message() {
        let conn = transport(100, 500).create_connection();
        let reader = conn.clone();
        let pending = tokio::spawn(async move { reader.receive().await });

        conn.forward_inbound("foo".to_string()).await.unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), "foo");
    }

    #[tokio::test]
    async fn forward_without_reader_reports_busy() {
        let conn = transport(100, 30).create_connection();
        // The first message fills the hand-off slot; the second has nowhere to go.
        conn.forward_inbound("one".to_string()).await.unwrap();
        let err = conn.forward_inbound("two".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::Busy(_)));
        assert_eq!(conn.receive().await.unwrap(), "one");
    }

    #[tokio::test]
    async fn send_times_out_without_poll() {
        let conn = transport(100, 30).create_connection();
        let err = conn.send("hello").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn poll_skips_messages_whose_sender_gave_up() {
        let conn = transport(100, 20).create_connection();
        assert!(conn.send("stale").await.is_err());

        let (mut sink, _pending) = ResponseSink::channel();
        let polled = conn.next_outbound(Duration::from_millis(40), &mut sink).await;
        assert!(matches!(polled, Polled::Idle));
    }

    #[tokio::test]
    async fn send_completes_on_delivered_outcome() {
        let conn = transport(100, 500).create_connection();
        let sender = conn.clone();
        let sending = tokio::spawn(async move { sender.send("hello").await });

        let (mut sink, _pending) = ResponseSink::channel();
        let Polled::Message(item) = conn.next_outbound(Duration::from_millis(200), &mut sink).await else {
            panic!("expected a message");
        };
        assert_eq!(item.payload, "hello");
        item.outcome.send(WriteOutcome::Delivered).unwrap();

        sending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_reports_failed_write() {
        let conn = transport(100, 500).create_connection();
        let sender = conn.clone();
        let sending = tokio::spawn(async move { sender.send("hello").await });

        let (mut sink, _pending) = ResponseSink::channel();
        let Polled::Message(item) = conn.next_outbound(Duration::from_millis(200), &mut sink).await else {
            panic!("expected a message");
        };
        item.outcome
            .send(WriteOutcome::Failed("broken pipe".to_string()))
            .unwrap();

        let err = sending.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::DeliveryFailed(reason) if reason == "broken pipe"));
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let conn = transport(100, 5_000).create_connection();

        let reader = conn.clone();
        let receiving = tokio::spawn(async move { reader.receive().await });
        let sender = conn.clone();
        let sending = tokio::spawn(async move { sender.send("never read").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close();
        conn.close();

        assert!(matches!(receiving.await.unwrap(), Err(TransportError::Closed)));
        assert!(matches!(sending.await.unwrap(), Err(TransportError::Closed)));
        assert!(conn.is_closed());

        let (mut sink, _pending) = ResponseSink::channel();
        let polled = conn.next_outbound(Duration::from_secs(5), &mut sink).await;
        assert!(matches!(polled, Polled::Closed));
    }

    #[tokio::test]
    async fn close_deregisters_session() {
        let transport = transport(100, 500);
        let conn = transport.create_connection();
        transport.bind_session("s1", &conn).unwrap();
        assert_eq!(transport.session_count(), 1);

        conn.close();
        assert!(transport.lookup("s1").is_none());
        assert_eq!(transport.session_count(), 0);
        assert!(matches!(
            transport.bind_session("s1", &conn),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn poll_notices_departed_client() {
        let conn = transport(100, 500).create_connection();
        let (mut sink, pending) = ResponseSink::channel();
        drop(pending);

        let polled = conn.next_outbound(Duration::from_secs(5), &mut sink).await;
        assert!(matches!(polled, Polled::ClientGone));
    }
}
