//! sluice wire codec primitives.
//!
//! Classifies inbound envelopes into data and control messages, maps status
//! codes onto typed API errors, and encodes/decodes the small protocol
//! payloads used by pull consumers: pull requests, ack tokens, header blocks
//! and reply-subject metadata.

pub mod ack;
pub mod error;
pub mod headers;
pub mod metadata;
pub mod pull;
pub mod status;
