use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Body of a pull request published to a consumer's next-message subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Maximum number of messages the server may deliver for this request.
    pub batch: usize,
    /// Server-side expiry in nanoseconds; absent for no-wait probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
    /// Ask the server to answer immediately, with a 404 if nothing is pending.
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_wait: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl PullRequest {
    /// A probe that returns whatever is available right now.
    pub fn no_wait(batch: usize) -> Self {
        Self {
            batch,
            expires: None,
            no_wait: true,
        }
    }

    /// A request the server holds open for up to `expires`.
    pub fn expiring(batch: usize, expires: Duration) -> Self {
        Self {
            batch,
            expires: Some(u64::try_from(expires.as_nanos()).unwrap_or(u64::MAX)),
            no_wait: false,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Subject a pull request for `stream`/`consumer` is published to.
pub fn next_message_subject(api_prefix: &str, stream: &str, consumer: &str) -> String {
    format!("{api_prefix}.CONSUMER.MSG.NEXT.{stream}.{consumer}")
}
