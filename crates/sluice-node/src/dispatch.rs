use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sluice_codec::status::classify;
use sluice_core::{Envelope, SubjectError};
use sluice_transport::adapter::InboundSink;
use tracing::{trace, warn};

use crate::config::ClientConfig;
use crate::matcher::SubjectMatcher;
use crate::queue::{DeliveryQueue, QueueLimits};

/// Subscription id assigned by [`Dispatcher::subscribe`].
pub type Sid = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Inbound envelopes seen by the dispatcher.
    pub received: u64,
    /// Envelopes that matched no subscription.
    pub unmatched: u64,
    /// Queue pushes that succeeded (one envelope may fan out to many).
    pub delivered: u64,
    /// Queue pushes rejected by slow-consumer limits.
    pub dropped: u64,
}

struct Registration {
    pattern: String,
    queue: Arc<DeliveryQueue>,
}

/// Routes inbound traffic to per-subscription queues.
///
/// Each envelope is classified once, matched against the registered
/// patterns, and a copy is pushed to every matching queue.
pub struct Dispatcher {
    matcher: SubjectMatcher<Sid>,
    registrations: RwLock<HashMap<Sid, Registration>>,
    next_sid: AtomicU64,
    queue_limits: QueueLimits,
    stats: Mutex<DispatchStats>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            matcher: SubjectMatcher::with_cache_capacity(config.match_cache_capacity),
            registrations: RwLock::default(),
            next_sid: AtomicU64::new(1),
            queue_limits: config.queue_limits(),
            stats: Mutex::default(),
        }
    }

    /// Registers a new queue for `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Result<(Sid, Arc<DeliveryQueue>), SubjectError> {
        let sid = self.next_sid.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(DeliveryQueue::with_limits(self.queue_limits));
        self.registrations.write().insert(
            sid,
            Registration {
                pattern: pattern.to_string(),
                queue: Arc::clone(&queue),
            },
        );
        if let Err(err) = self.matcher.insert(pattern, sid) {
            self.registrations.write().remove(&sid);
            return Err(err);
        }
        Ok((sid, queue))
    }

    /// Deregisters `sid`; returns false if it was not subscribed.
    pub fn unsubscribe(&self, sid: Sid) -> bool {
        let Some(registration) = self.registrations.write().remove(&sid) else {
            return false;
        };
        self.matcher.remove(&registration.pattern, &sid)
    }

    pub fn subscription_count(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn matcher(&self) -> &SubjectMatcher<Sid> {
        &self.matcher
    }

    pub fn stats(&self) -> DispatchStats {
        *self.stats.lock()
    }
}

impl InboundSink for Dispatcher {
    fn deliver(&self, envelope: Envelope) {
        let sids = self.matcher.matches(&envelope.subject);
        let queues: Vec<(Sid, Arc<DeliveryQueue>)> = {
            let registrations = self.registrations.read();
            sids.iter()
                .filter_map(|sid| {
                    registrations
                        .get(sid)
                        .map(|r| (*sid, Arc::clone(&r.queue)))
                })
                .collect()
        };
        trace!(subject = %envelope.subject, targets = queues.len(), "dispatch");

        let mut delivered = 0;
        let mut dropped = 0;
        if !queues.is_empty() {
            let inbound = classify(envelope);
            for (sid, queue) in &queues {
                match queue.push(inbound.clone()) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        dropped += 1;
                        warn!(sid, subject = %inbound.subject(), %err, "dropping message");
                    }
                }
            }
        }

        let mut stats = self.stats.lock();
        stats.received += 1;
        if queues.is_empty() {
            stats.unmatched += 1;
        }
        stats.delivered += delivered;
        stats.dropped += dropped;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DispatchStats, Dispatcher};
    use crate::config::ClientConfig;
    use sluice_codec::status::{ControlStatus, Inbound};
    use sluice_core::{Envelope, DESCRIPTION_HEADER, STATUS_HEADER};
    use sluice_transport::adapter::InboundSink;

    #[test]
    fn fans_out_to_every_matching_queue() {
        let dispatcher = Dispatcher::default();
        let (_, exact) = dispatcher.subscribe("orders.eu").expect("subscribe");
        let (_, wide) = dispatcher.subscribe("orders.>").expect("subscribe");
        let (_, other) = dispatcher.subscribe("billing.*").expect("subscribe");

        dispatcher.deliver(Envelope::new("orders.eu", b"o1".to_vec()));
        dispatcher.deliver(Envelope::new("orders.us.west", b"o2".to_vec()));
        dispatcher.deliver(Envelope::new("audit", b"a".to_vec()));

        assert_eq!(exact.len(), 1);
        assert_eq!(wide.len(), 2);
        assert!(other.is_empty());
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                received: 3,
                unmatched: 1,
                delivered: 3,
                dropped: 0,
            }
        );
    }

    #[test]
    fn status_envelopes_arrive_classified() {
        let dispatcher = Dispatcher::default();
        let (_, queue) = dispatcher.subscribe("_INBOX.x").expect("subscribe");
        dispatcher.deliver(
            Envelope::new("_INBOX.x", Vec::<u8>::new())
                .with_header(STATUS_HEADER, "404")
                .with_header(DESCRIPTION_HEADER, "No Messages"),
        );
        match queue.pop() {
            Some(Inbound::Control(ctrl)) => assert_eq!(ctrl.status, ControlStatus::NoMessages),
            other => panic!("expected a control message, got {other:?}"),
        }
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = Dispatcher::default();
        let (sid, queue) = dispatcher.subscribe("a.*").expect("subscribe");
        assert!(dispatcher.unsubscribe(sid));
        assert!(!dispatcher.unsubscribe(sid));
        dispatcher.deliver(Envelope::new("a.b", b"x".to_vec()));
        assert!(queue.is_empty());
        assert_eq!(dispatcher.subscription_count(), 0);
        assert_eq!(dispatcher.matcher().count(), 0);
    }

    #[test]
    fn invalid_pattern_leaves_no_registration() {
        let dispatcher = Dispatcher::default();
        assert!(dispatcher.subscribe("a.>.b").is_err());
        assert_eq!(dispatcher.subscription_count(), 0);
    }

    #[test]
    fn slow_consumer_drops_are_counted() {
        let config = ClientConfig {
            pending_msgs_limit: 1,
            ..ClientConfig::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(&config));
        let (_, queue) = dispatcher.subscribe("s").expect("subscribe");
        dispatcher.deliver(Envelope::new("s", b"1".to_vec()));
        dispatcher.deliver(Envelope::new("s", b"2".to_vec()));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(dispatcher.stats().dropped, 1);
    }
}
