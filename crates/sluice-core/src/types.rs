use std::collections::BTreeMap;

use bytes::Bytes;

/// Header key carrying a numeric status code on control messages.
pub const STATUS_HEADER: &str = "Status";
/// Header key carrying the optional human-readable status description.
pub const DESCRIPTION_HEADER: &str = "Description";

/// Message headers; keys are unique.
pub type HeaderMap = BTreeMap<String, String>;

/// One inbound or outbound message as seen at the transport boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Literal subject the message was published to.
    pub subject: String,
    /// Optional reply-to subject.
    pub reply: Option<String>,
    /// Optional headers.
    pub headers: Option<HeaderMap>,
    /// Application payload.
    pub payload: Bytes,
}

impl Envelope {
    /// Creates a header-less envelope.
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            headers: None,
            payload: payload.into(),
        }
    }

    /// Sets the reply-to subject.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Adds one header entry, replacing any previous value for `key`.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Looks up a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|h| h.get(key))
            .map(String::as_str)
    }

    /// Payload size used for queue byte accounting.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
