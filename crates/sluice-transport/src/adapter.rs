use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use sluice_core::{Envelope, HeaderMap};
use thiserror::Error;
use tracing::trace;

/// Coarse per-transport health counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHealthSnapshot {
    pub outbound_published: u64,
    pub outbound_dropped: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub inbound_delivered: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// A request got no reply before its deadline.
    #[error("request timed out")]
    Timeout,
    /// Nobody is subscribed to the request subject.
    #[error("no responders for {0}")]
    NoResponders(String),
    /// The connection is closed.
    #[error("transport closed")]
    Closed,
    #[error("io error: {0}")]
    Io(String),
}

/// Receives decoded inbound envelopes from the transport's read loop.
pub trait InboundSink: Send + Sync {
    fn deliver(&self, envelope: Envelope);
}

/// Outbound publish/request contract used by pull consumers and acks.
pub trait Transport: Send + Sync {
    /// Fire-and-forget publish.
    fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        headers: Option<&HeaderMap>,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Publishes `payload` and waits up to `timeout` for the first reply.
    fn request(
        &self,
        subject: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Envelope, TransportError>;

    /// Best-effort health counters for diagnostics.
    fn health_snapshot(&self) -> TransportHealthSnapshot {
        TransportHealthSnapshot::default()
    }
}

/// Computes replies for messages published through an [`InMemoryTransport`].
pub type Responder = dyn Fn(&Envelope) -> Vec<Envelope> + Send + Sync;

#[derive(Debug, Default)]
struct InMemoryState {
    outbound: Vec<Envelope>,
    drop_outbound: bool,
    closed: bool,
    health: TransportHealthSnapshot,
}

/// In-process transport for tests and simulations.
///
/// Every publish is captured. A configured responder is consulted for each
/// publish and its replies are handed to the connected sink, which lets a
/// test play the server side of a protocol. With loopback enabled, published
/// messages are also delivered back to the sink.
#[derive(Default)]
pub struct InMemoryTransport {
    state: Mutex<InMemoryState>,
    sink: RwLock<Option<Arc<dyn InboundSink>>>,
    responder: RwLock<Option<Arc<Responder>>>,
    loopback: RwLock<bool>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects the sink that receives inbound traffic.
    pub fn connect(&self, sink: Arc<dyn InboundSink>) {
        *self.sink.write() = Some(sink);
    }

    /// Installs the responder consulted on every publish and request.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Envelope) -> Vec<Envelope> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Arc::new(responder));
    }

    pub fn clear_responder(&self) {
        *self.responder.write() = None;
    }

    /// If enabled, published messages are echoed to the connected sink.
    pub fn set_loopback(&self, loopback: bool) {
        *self.loopback.write() = loopback;
    }

    /// If enabled, publishes succeed but are neither captured nor answered.
    pub fn set_drop_outbound(&self, drop_outbound: bool) {
        self.state.lock().drop_outbound = drop_outbound;
    }

    /// Makes every later publish/request fail with [`TransportError::Closed`].
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Delivers an envelope to the sink as if it arrived from the network.
    pub fn enqueue_inbound(&self, envelope: Envelope) {
        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            self.state.lock().health.inbound_delivered += 1;
            sink.deliver(envelope);
        }
    }

    /// Drains and returns all outbound messages captured so far.
    pub fn take_outbound(&self) -> Vec<Envelope> {
        std::mem::take(&mut self.state.lock().outbound)
    }

    /// Captured outbound messages published to `subject`, without draining.
    pub fn outbound_to(&self, subject: &str) -> Vec<Envelope> {
        self.state
            .lock()
            .outbound
            .iter()
            .filter(|env| env.subject == subject)
            .cloned()
            .collect()
    }

    fn record(&self, envelope: &Envelope) -> Result<bool, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            state.health.last_error = Some(TransportError::Closed.to_string());
            return Err(TransportError::Closed);
        }
        if state.drop_outbound {
            state.health.outbound_dropped += 1;
            return Ok(false);
        }
        state.outbound.push(envelope.clone());
        Ok(true)
    }

    fn respond(&self, envelope: &Envelope) -> Option<Vec<Envelope>> {
        let responder = self.responder.read().clone()?;
        Some(responder(envelope))
    }
}

fn outbound_envelope(
    subject: &str,
    reply: Option<&str>,
    headers: Option<&HeaderMap>,
    payload: &[u8],
) -> Envelope {
    Envelope {
        subject: subject.to_string(),
        reply: reply.map(str::to_string),
        headers: headers.cloned(),
        payload: Bytes::copy_from_slice(payload),
    }
}

impl Transport for InMemoryTransport {
    fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        headers: Option<&HeaderMap>,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let envelope = outbound_envelope(subject, reply, headers, payload);
        if !self.record(&envelope)? {
            return Ok(());
        }
        self.state.lock().health.outbound_published += 1;
        trace!(subject, bytes = payload.len(), "in-memory publish");

        let replies = self.respond(&envelope).unwrap_or_default();
        if *self.loopback.read() {
            self.enqueue_inbound(envelope);
        }
        for reply in replies {
            self.enqueue_inbound(reply);
        }
        Ok(())
    }

    fn request(
        &self,
        subject: &str,
        payload: &[u8],
        _timeout: Duration,
    ) -> Result<Envelope, TransportError> {
        let envelope = outbound_envelope(subject, None, None, payload);
        self.state.lock().health.requests_sent += 1;
        let outcome = if self.record(&envelope)? {
            match self.respond(&envelope) {
                Some(replies) => replies.into_iter().next().ok_or(TransportError::Timeout),
                None => Err(TransportError::NoResponders(subject.to_string())),
            }
        } else {
            Err(TransportError::Timeout)
        };
        if let Err(err) = &outcome {
            let mut state = self.state.lock();
            state.health.requests_failed += 1;
            state.health.last_error = Some(err.to_string());
        }
        outcome
    }

    fn health_snapshot(&self) -> TransportHealthSnapshot {
        self.state.lock().health.clone()
    }
}
