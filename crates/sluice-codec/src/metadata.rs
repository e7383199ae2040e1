use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// First token of every ack reply subject.
pub const ACK_PREFIX_0: &str = "$JS";
/// Second token of every ack reply subject.
pub const ACK_PREFIX_1: &str = "ACK";
/// Token standing in for "no domain" in the full layout.
pub const NO_DOMAIN_TOKEN: &str = "_";

/// `$JS.ACK.<stream>.<consumer>.<delivered>.<sseq>.<cseq>.<ts>.<pending>`
const LEGACY_TOKEN_COUNT: usize = 9;
/// `$JS.ACK.<domain>.<hash>.<stream>.<consumer>.<delivered>.<sseq>.<cseq>.<ts>.<pending>`,
/// optionally followed by further tokens.
const FULL_TOKEN_COUNT: usize = 11;

const DOMAIN_IDX: usize = 2;
const ACCOUNT_HASH_IDX: usize = 3;
const STREAM_IDX: usize = 4;
const CONSUMER_IDX: usize = 5;
const DELIVERED_IDX: usize = 6;
const STREAM_SEQ_IDX: usize = 7;
const CONSUMER_SEQ_IDX: usize = 8;
const TIMESTAMP_IDX: usize = 9;
const PENDING_IDX: usize = 10;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Reply subject is missing or does not have the ack subject shape.
    #[error("not a stream message")]
    NotJsMessage,
}

/// Stream and consumer positions of one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePair {
    pub stream: u64,
    pub consumer: u64,
}

/// Delivery timestamp split into whole seconds and sub-second nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: u64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn from_unix_nanos(nanos: u64) -> Self {
        Self {
            seconds: nanos / NANOS_PER_SECOND,
            // Remainder is below 1e9 and fits.
            nanos: (nanos % NANOS_PER_SECOND) as u32,
        }
    }

    pub fn as_unix_nanos(&self) -> u128 {
        u128::from(self.seconds) * u128::from(NANOS_PER_SECOND) + u128::from(self.nanos)
    }

    /// `None` when the value lies beyond what the platform clock represents.
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let offset = Duration::from_secs(self.seconds)
            .checked_add(Duration::from_nanos(u64::from(self.nanos)))?;
        UNIX_EPOCH.checked_add(offset)
    }
}

/// Consumer-side metadata decoded from an ack reply subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMetadata {
    pub sequence: SequencePair,
    pub num_delivered: u64,
    pub num_pending: u64,
    pub timestamp: Timestamp,
    pub stream: String,
    pub consumer: String,
    /// Empty when the subject carries no domain.
    pub domain: String,
}

fn parse_number(token: &str) -> Result<u64, MetadataError> {
    token.parse().map_err(|_| MetadataError::NotJsMessage)
}

/// Decodes an ack reply subject in either the legacy or the full layout.
pub fn parse_ack_subject(reply: &str) -> Result<ConsumerMetadata, MetadataError> {
    let mut tokens: Vec<&str> = reply.split('.').collect();
    if tokens.len() < 2 || tokens[0] != ACK_PREFIX_0 || tokens[1] != ACK_PREFIX_1 {
        return Err(MetadataError::NotJsMessage);
    }
    match tokens.len() {
        LEGACY_TOKEN_COUNT => {
            tokens.insert(DOMAIN_IDX, "");
            tokens.insert(ACCOUNT_HASH_IDX, "");
        }
        n if n >= FULL_TOKEN_COUNT => {}
        _ => return Err(MetadataError::NotJsMessage),
    }

    let stream = tokens[STREAM_IDX];
    let consumer = tokens[CONSUMER_IDX];
    if stream.is_empty() || consumer.is_empty() {
        return Err(MetadataError::NotJsMessage);
    }
    let domain = match tokens[DOMAIN_IDX] {
        NO_DOMAIN_TOKEN => "",
        domain => domain,
    };

    Ok(ConsumerMetadata {
        sequence: SequencePair {
            stream: parse_number(tokens[STREAM_SEQ_IDX])?,
            consumer: parse_number(tokens[CONSUMER_SEQ_IDX])?,
        },
        num_delivered: parse_number(tokens[DELIVERED_IDX])?,
        num_pending: parse_number(tokens[PENDING_IDX])?,
        timestamp: Timestamp::from_unix_nanos(parse_number(tokens[TIMESTAMP_IDX])?),
        stream: stream.to_string(),
        consumer: consumer.to_string(),
        domain: domain.to_string(),
    })
}
