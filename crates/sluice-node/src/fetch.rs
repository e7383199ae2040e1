use std::sync::Arc;
use std::time::{Duration, Instant};

use sluice_codec::error::CodecError;
use sluice_codec::pull::{next_message_subject, PullRequest};
use sluice_codec::status::{ApiError, ControlMessage, ControlStatus, Inbound};
use sluice_core::{validate_subject, Envelope, SubjectError};
use sluice_transport::adapter::{Transport, TransportError};
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, Sid};
use crate::inbox::new_inbox;
use crate::message::JsMessage;
use crate::queue::DeliveryQueue;

/// Longest wait a single fetch honors; larger timeouts are clamped to it.
pub const MAX_FETCH_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("batch size must be at least 1")]
    InvalidBatch,
    #[error("fetch timed out")]
    Timeout,
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("invalid subject: {0}")]
    Subject(#[from] SubjectError),
}

/// A pull consumer bound to its own reply inbox.
///
/// Messages requested with [`PullSubscription::fetch`] are routed by the
/// dispatcher into this subscription's queue. Dropping the subscription
/// deregisters the inbox.
pub struct PullSubscription {
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    sid: Sid,
    queue: Arc<DeliveryQueue>,
    inbox: String,
    pull_subject: String,
    stream: String,
    consumer: String,
    expires_margin: Duration,
    ack_sync_timeout: Duration,
}

impl std::fmt::Debug for PullSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullSubscription")
            .field("sid", &self.sid)
            .field("inbox", &self.inbox)
            .field("pull_subject", &self.pull_subject)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl PullSubscription {
    pub fn subscribe(
        dispatcher: Arc<Dispatcher>,
        transport: Arc<dyn Transport>,
        stream: &str,
        consumer: &str,
        config: &ClientConfig,
    ) -> Result<Self, FetchError> {
        let pull_subject = next_message_subject(&config.api_prefix, stream, consumer);
        validate_subject(&pull_subject)?;
        let inbox = new_inbox(&config.inbox_prefix);
        let (sid, queue) = dispatcher.subscribe(&inbox)?;
        debug!(sid, %inbox, %pull_subject, "pull subscription created");
        Ok(Self {
            dispatcher,
            transport,
            sid,
            queue,
            inbox,
            pull_subject,
            stream: stream.to_string(),
            consumer: consumer.to_string(),
            expires_margin: config.expires_margin,
            ack_sync_timeout: config.ack_sync_timeout,
        })
    }

    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    pub fn pull_subject(&self) -> &str {
        &self.pull_subject
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Messages and sentinels waiting in the local queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Retrieves up to `batch` messages, waiting at most `timeout`.
    ///
    /// Returns at least one message or an error. A batch may come back short
    /// once the deadline passes after the server reported it had nothing
    /// more to deliver.
    pub fn fetch(&self, batch: usize, timeout: Duration) -> Result<Vec<JsMessage>, FetchError> {
        if batch == 0 {
            return Err(FetchError::InvalidBatch);
        }
        let timeout = timeout.min(MAX_FETCH_WAIT);
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now);
        let fetched = if batch == 1 {
            self.fetch_one(timeout, deadline).map(|msg| vec![msg])
        } else {
            self.fetch_batch(batch, deadline)
        };
        match &fetched {
            Ok(msgs) => debug!(sid = self.sid, batch, received = msgs.len(), "fetch done"),
            Err(err) => debug!(sid = self.sid, batch, %err, "fetch failed"),
        }
        fetched
    }

    /// Single-message fetch. Any benign sentinel that answers the request,
    /// including `NoMessages`, ends it as [`FetchError::Timeout`].
    fn fetch_one(&self, timeout: Duration, deadline: Instant) -> Result<JsMessage, FetchError> {
        match self.queue.pop() {
            Some(Inbound::Data(env)) => return Ok(self.wrap(env)),
            Some(Inbound::Control(ctrl)) => self.discard_benign(ctrl)?,
            None => {}
        }

        self.request(self.expiring(1, timeout))?;
        match self.queue.pop_until(deadline) {
            Some(Inbound::Data(env)) => Ok(self.wrap(env)),
            Some(Inbound::Control(ctrl)) if ctrl.status.is_benign() => Err(FetchError::Timeout),
            Some(Inbound::Control(ctrl)) => Err(ctrl.status.to_error().into()),
            None => Err(FetchError::Timeout),
        }
    }

    fn fetch_batch(&self, batch: usize, deadline: Instant) -> Result<Vec<JsMessage>, FetchError> {
        let mut msgs = Vec::with_capacity(batch);

        // Enough already buffered: drain exactly `batch` entries without
        // asking the server for more, even if sentinels leave us short.
        if self.queue.len() >= batch {
            for _ in 0..batch {
                match self.queue.pop() {
                    Some(Inbound::Data(env)) => msgs.push(self.wrap(env)),
                    Some(Inbound::Control(ctrl)) => self.discard_benign(ctrl)?,
                    None => break,
                }
            }
            if !msgs.is_empty() {
                return Ok(msgs);
            }
        }

        self.request(PullRequest::no_wait(batch))?;
        let mut expiring_outstanding = false;
        match self.queue.pop_until(deadline) {
            None => return Err(FetchError::Timeout),
            Some(Inbound::Data(env)) => msgs.push(self.wrap(env)),
            Some(Inbound::Control(ctrl)) => match ctrl.status {
                ControlStatus::NoMessages => {
                    self.request(self.expiring(batch, remaining(deadline)))?;
                    expiring_outstanding = true;
                }
                ControlStatus::RequestTimeout => return Err(FetchError::Timeout),
                status => return Err(status.to_error().into()),
            },
        }

        while msgs.len() < batch && Instant::now() < deadline {
            let Some(item) = self.queue.pop_until(deadline) else {
                break;
            };
            let status = match item {
                Inbound::Data(env) => {
                    msgs.push(self.wrap(env));
                    continue;
                }
                Inbound::Control(ctrl) => ctrl.status,
            };
            if !status.is_benign() {
                return Err(status.to_error().into());
            }
            if Instant::now() >= deadline {
                break;
            }
            match status {
                ControlStatus::NoMessages if !expiring_outstanding => {
                    self.request(self.expiring(batch - msgs.len(), remaining(deadline)))?;
                    expiring_outstanding = true;
                }
                ControlStatus::RequestTimeout => expiring_outstanding = false,
                _ => {}
            }
        }

        if msgs.is_empty() {
            Err(FetchError::Timeout)
        } else {
            Ok(msgs)
        }
    }

    /// Drops a NoMessages/RequestTimeout sentinel; anything else is an error.
    fn discard_benign(&self, ctrl: ControlMessage) -> Result<(), FetchError> {
        if ctrl.status.is_benign() {
            trace!(sid = self.sid, code = ctrl.status.code(), "discarding stale sentinel");
            Ok(())
        } else {
            Err(ctrl.status.to_error().into())
        }
    }

    /// An expiring request the server gives up on just before we do. Falls
    /// back to a no-wait probe when no time is left for the server to hold it.
    fn expiring(&self, batch: usize, wait: Duration) -> PullRequest {
        match wait.checked_sub(self.expires_margin) {
            Some(expires) if !expires.is_zero() => PullRequest::expiring(batch, expires),
            _ => PullRequest::no_wait(batch),
        }
    }

    fn request(&self, request: PullRequest) -> Result<(), FetchError> {
        let payload = request.encode()?;
        debug!(
            subject = %self.pull_subject,
            batch = request.batch,
            no_wait = request.no_wait,
            expires = ?request.expires,
            "issuing pull request"
        );
        self.transport
            .publish(&self.pull_subject, Some(self.inbox.as_str()), None, &payload)?;
        Ok(())
    }

    fn wrap(&self, envelope: Envelope) -> JsMessage {
        JsMessage::new(envelope, Arc::clone(&self.transport))
            .with_ack_sync_timeout(self.ack_sync_timeout)
    }
}

impl Drop for PullSubscription {
    fn drop(&mut self) {
        self.dispatcher.unsubscribe(self.sid);
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
