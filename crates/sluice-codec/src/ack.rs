use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Acknowledge: processing finished.
pub const ACK_TOKEN: &[u8] = b"+ACK";
/// Negative-acknowledge: redeliver, optionally after a delay.
pub const NAK_TOKEN: &[u8] = b"-NAK";
/// Terminate: never redeliver.
pub const TERM_TOKEN: &[u8] = b"+TERM";
/// Work in progress: reset the redelivery timer.
pub const IN_PROGRESS_TOKEN: &[u8] = b"+WPI";

/// The four acknowledgment outcomes a consumer can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Ack,
    Nak { delay: Option<Duration> },
    Term,
    InProgress,
}

#[derive(Debug, Serialize, Deserialize)]
struct NakArgs {
    /// Redelivery delay in nanoseconds.
    delay: u64,
}

impl AckKind {
    /// Whether this outcome settles the message (everything but in-progress).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Encodes the control payload published to the message's reply subject.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let payload = match self {
            Self::Ack => ACK_TOKEN.to_vec(),
            Self::Term => TERM_TOKEN.to_vec(),
            Self::InProgress => IN_PROGRESS_TOKEN.to_vec(),
            Self::Nak { delay: None } => NAK_TOKEN.to_vec(),
            Self::Nak { delay: Some(delay) } => {
                let args = NakArgs {
                    delay: u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX),
                };
                let mut payload = NAK_TOKEN.to_vec();
                payload.push(b' ');
                payload.extend_from_slice(&serde_json::to_vec(&args)?);
                payload
            }
        };
        Ok(payload)
    }

    /// Decodes a control payload; returns `None` for anything unrecognized.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        match payload {
            ACK_TOKEN => Some(Self::Ack),
            TERM_TOKEN => Some(Self::Term),
            IN_PROGRESS_TOKEN => Some(Self::InProgress),
            NAK_TOKEN => Some(Self::Nak { delay: None }),
            _ => {
                let args = payload.strip_prefix(NAK_TOKEN)?.strip_prefix(b" ")?;
                let args: NakArgs = serde_json::from_slice(args).ok()?;
                Some(Self::Nak {
                    delay: Some(Duration::from_nanos(args.delay)),
                })
            }
        }
    }
}
