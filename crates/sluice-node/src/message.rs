use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use sluice_codec::ack::AckKind;
use sluice_codec::error::CodecError;
use sluice_codec::metadata::{parse_ack_subject, ConsumerMetadata, MetadataError};
use sluice_codec::status::{check_response, ApiError};
use sluice_core::{Envelope, HeaderMap};
use sluice_transport::adapter::{Transport, TransportError};
use thiserror::Error;
use tracing::debug;

use crate::config::DEFAULT_ACK_SYNC_TIMEOUT;

#[derive(Debug, Error)]
pub enum AckError {
    #[error("message was already acknowledged")]
    AlreadyAcknowledged,
    #[error("not a stream message")]
    NotJsMessage,
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// A message delivered by a pull consumer, with its acknowledgment state.
///
/// The first successful `ack`, `ack_sync`, `nak` or `term` settles the
/// message; later calls fail with [`AckError::AlreadyAcknowledged`].
pub struct JsMessage {
    envelope: Envelope,
    transport: Arc<dyn Transport>,
    acked: AtomicBool,
    metadata: OnceLock<Result<ConsumerMetadata, MetadataError>>,
    ack_sync_timeout: Duration,
}

impl std::fmt::Debug for JsMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsMessage")
            .field("subject", &self.envelope.subject)
            .field("reply", &self.envelope.reply)
            .field("payload_len", &self.envelope.payload_len())
            .field("acked", &self.is_acked())
            .finish()
    }
}

impl JsMessage {
    pub fn new(envelope: Envelope, transport: Arc<dyn Transport>) -> Self {
        Self {
            envelope,
            transport,
            acked: AtomicBool::new(false),
            metadata: OnceLock::new(),
            ack_sync_timeout: DEFAULT_ACK_SYNC_TIMEOUT,
        }
    }

    pub fn with_ack_sync_timeout(mut self, timeout: Duration) -> Self {
        self.ack_sync_timeout = timeout;
        self
    }

    pub fn subject(&self) -> &str {
        &self.envelope.subject
    }

    pub fn reply(&self) -> Option<&str> {
        self.envelope.reply.as_deref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.envelope.payload
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.envelope.headers.as_ref()
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.envelope.header(key)
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }

    /// Whether a terminal acknowledgment has been sent.
    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    /// Stream metadata decoded from the reply subject, computed once.
    pub fn metadata(&self) -> Result<&ConsumerMetadata, MetadataError> {
        self.metadata
            .get_or_init(|| match self.reply() {
                Some(reply) => parse_ack_subject(reply),
                None => Err(MetadataError::NotJsMessage),
            })
            .as_ref()
            .map_err(|err| *err)
    }

    /// Acknowledges the message without waiting for confirmation.
    pub fn ack(&self) -> Result<(), AckError> {
        self.respond(AckKind::Ack, None)
    }

    /// Acknowledges the message and waits for the server to confirm.
    ///
    /// `None` uses the configured confirmation timeout.
    pub fn ack_sync(&self, timeout: Option<Duration>) -> Result<(), AckError> {
        self.respond(AckKind::Ack, Some(timeout.unwrap_or(self.ack_sync_timeout)))
    }

    /// Asks for redelivery, optionally no sooner than `delay`.
    pub fn nak(&self, delay: Option<Duration>) -> Result<(), AckError> {
        self.respond(AckKind::Nak { delay }, None)
    }

    /// Stops redelivery of this message for good.
    pub fn term(&self) -> Result<(), AckError> {
        self.respond(AckKind::Term, None)
    }

    /// Resets the server's redelivery timer. May be repeated until the
    /// message is settled.
    pub fn in_progress(&self) -> Result<(), AckError> {
        self.respond(AckKind::InProgress, None)
    }

    /// Sends `kind` to the reply subject. With a timeout, the send is a
    /// request and the server's reply is checked for an error status.
    ///
    /// A failed send leaves the message unsettled so it can be retried.
    pub fn respond(&self, kind: AckKind, timeout: Option<Duration>) -> Result<(), AckError> {
        let reply = match self.reply() {
            Some(reply) if !reply.is_empty() => reply,
            _ => return Err(AckError::NotJsMessage),
        };

        if kind.is_terminal() {
            self.acked
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .map_err(|_| AckError::AlreadyAcknowledged)?;
        } else if self.is_acked() {
            return Err(AckError::AlreadyAcknowledged);
        }

        let outcome = self.send(reply, kind, timeout);
        if outcome.is_err() && kind.is_terminal() {
            self.acked.store(false, Ordering::Release);
        }
        outcome
    }

    fn send(&self, reply: &str, kind: AckKind, timeout: Option<Duration>) -> Result<(), AckError> {
        let payload = kind.encode()?;
        match timeout {
            None => self.transport.publish(reply, None, None, &payload)?,
            Some(timeout) => {
                let response = self.transport.request(reply, &payload, timeout)?;
                check_response(response)?;
            }
        }
        debug!(subject = reply, ?kind, sync = timeout.is_some(), "ack sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{AckError, JsMessage};
    use sluice_codec::ack::AckKind;
    use sluice_codec::metadata::MetadataError;
    use sluice_codec::status::ApiError;
    use sluice_core::{Envelope, DESCRIPTION_HEADER, STATUS_HEADER};
    use sluice_transport::adapter::{InMemoryTransport, Transport};

    const REPLY: &str = "$JS.ACK.ORDERS.worker.1.10.5.1700000000000000000.3";

    fn message(transport: &Arc<InMemoryTransport>) -> JsMessage {
        let transport: Arc<dyn Transport> = transport.clone();
        JsMessage::new(
            Envelope::new("orders.new", b"body".to_vec()).with_reply(REPLY),
            transport,
        )
    }

    #[test]
    fn ack_publishes_token_and_settles_once() {
        let transport = Arc::new(InMemoryTransport::new());
        let msg = message(&transport);
        msg.ack().expect("first ack should succeed");
        assert!(msg.is_acked());

        assert!(matches!(msg.ack(), Err(AckError::AlreadyAcknowledged)));
        assert!(matches!(msg.nak(None), Err(AckError::AlreadyAcknowledged)));
        assert!(matches!(msg.term(), Err(AckError::AlreadyAcknowledged)));
        assert!(matches!(msg.in_progress(), Err(AckError::AlreadyAcknowledged)));

        let sent = transport.take_outbound();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, REPLY);
        assert_eq!(&sent[0].payload[..], b"+ACK");
    }

    #[test]
    fn settled_message_hands_back_its_envelope() {
        let transport = Arc::new(InMemoryTransport::new());
        let msg = message(&transport);
        msg.ack().expect("ack");
        let envelope = msg.into_envelope();
        assert_eq!(envelope.subject, "orders.new");
        assert_eq!(envelope.reply.as_deref(), Some(REPLY));
        assert_eq!(&envelope.payload[..], b"body");
    }

    #[test]
    fn in_progress_repeats_before_a_terminal_ack() {
        let transport = Arc::new(InMemoryTransport::new());
        let msg = message(&transport);
        msg.in_progress().expect("wpi");
        msg.in_progress().expect("wpi again");
        assert!(!msg.is_acked());
        msg.nak(Some(Duration::from_millis(5))).expect("nak");

        let payloads: Vec<Vec<u8>> = transport
            .take_outbound()
            .into_iter()
            .map(|env| env.payload.to_vec())
            .collect();
        assert_eq!(
            payloads,
            vec![
                b"+WPI".to_vec(),
                b"+WPI".to_vec(),
                br#"-NAK {"delay":5000000}"#.to_vec(),
            ]
        );
    }

    #[test]
    fn concurrent_acks_settle_exactly_once() {
        let transport = Arc::new(InMemoryTransport::new());
        let msg = Arc::new(message(&transport));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let msg = Arc::clone(&msg);
                thread::spawn(move || if i % 2 == 0 { msg.ack() } else { msg.term() })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().expect("ack thread should not panic"))
            .filter(Result::is_ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(transport.take_outbound().len(), 1);
    }

    #[test]
    fn missing_reply_is_not_a_stream_message() {
        let transport: Arc<dyn Transport> = Arc::new(InMemoryTransport::new());
        let msg = JsMessage::new(Envelope::new("plain", b"x".to_vec()), transport);
        assert!(matches!(msg.ack(), Err(AckError::NotJsMessage)));
        assert_eq!(msg.metadata(), Err(MetadataError::NotJsMessage));
        assert!(!msg.is_acked());
    }

    #[test]
    fn metadata_is_parsed_from_reply() {
        let transport = Arc::new(InMemoryTransport::new());
        let msg = message(&transport);
        let md = msg.metadata().expect("metadata should parse");
        assert_eq!(md.stream, "ORDERS");
        assert_eq!(md.sequence.stream, 10);
        assert_eq!(md.num_pending, 3);
        assert!(std::ptr::eq(md, msg.metadata().expect("cached")));
    }

    #[test]
    fn ack_sync_checks_the_confirmation() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.set_responder(|env| vec![Envelope::new("_INBOX.r", env.payload.clone())]);
        let msg = message(&transport);
        msg.ack_sync(None).expect("confirmed ack");
        assert!(msg.is_acked());

        transport.set_responder(|_| {
            vec![Envelope::new("_INBOX.r", Vec::<u8>::new())
                .with_header(STATUS_HEADER, "503")
                .with_header(DESCRIPTION_HEADER, "down")]
        });
        let msg = message(&transport);
        match msg.ack_sync(Some(Duration::from_millis(10))) {
            Err(AckError::Api(ApiError::ServiceUnavailable { description })) => {
                assert_eq!(description, "down")
            }
            other => panic!("expected service unavailable, got {other:?}"),
        }
        assert!(!msg.is_acked(), "failed confirmation leaves the message pending");
    }

    #[test]
    fn failed_send_leaves_message_pending() {
        let transport = Arc::new(InMemoryTransport::new());
        let msg = message(&transport);
        transport.close();
        assert!(matches!(msg.term(), Err(AckError::Transport(_))));
        assert!(!msg.is_acked());

        let reopened = Arc::new(InMemoryTransport::new());
        let retry = message(&reopened);
        retry
            .respond(AckKind::Term, None)
            .expect("term on an open transport");
        assert_eq!(&reopened.take_outbound()[0].payload[..], b"+TERM");
    }
}
