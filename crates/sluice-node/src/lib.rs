//! sluice client engine: subject routing and pull-consumer delivery.
//!
//! The [`dispatch::Dispatcher`] receives inbound envelopes from a transport,
//! routes them through a wildcard-aware [`matcher::SubjectMatcher`] and fans
//! them out to per-subscription [`queue::DeliveryQueue`]s. Pull consumers
//! ([`fetch::PullSubscription`]) drain their queue under batch and deadline
//! limits, and hand out [`message::JsMessage`]s that enforce single-use
//! acknowledgment.

pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod inbox;
pub mod matcher;
pub mod message;
pub mod queue;

pub use config::{ClientConfig, ConfigError};
pub use dispatch::{DispatchStats, Dispatcher, Sid};
pub use fetch::{FetchError, PullSubscription};
pub use matcher::{MatcherStats, SubjectMatcher};
pub use message::{AckError, JsMessage};
pub use queue::{DeliveryQueue, QueueError, QueueLimits};
