use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use sluice_codec::status::Inbound;
use thiserror::Error;

/// Default cap on queued data messages per subscription.
pub const DEFAULT_PENDING_MSGS_LIMIT: usize = 512 * 1024;
/// Default cap on queued payload bytes per subscription.
pub const DEFAULT_PENDING_BYTES_LIMIT: usize = 64 * 1024 * 1024;

/// Slow-consumer limits for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub max_msgs: usize,
    pub max_bytes: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_msgs: DEFAULT_PENDING_MSGS_LIMIT,
            max_bytes: DEFAULT_PENDING_BYTES_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The message was dropped because the subscriber is not keeping up.
    #[error("slow consumer: {pending_msgs} messages / {pending_bytes} bytes pending")]
    SlowConsumer {
        pending_msgs: usize,
        pending_bytes: usize,
    },
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Inbound>,
    pending_bytes: usize,
    delivered: u64,
    dropped: u64,
}

impl QueueState {
    fn pop_front(&mut self) -> Option<Inbound> {
        let item = self.items.pop_front()?;
        self.pending_bytes -= item.payload_len();
        Some(item)
    }
}

/// FIFO of classified inbound messages with byte accounting and a
/// deadline-bounded blocking wait.
///
/// The dispatcher pushes and fetch logic pops; both go through the same
/// lock, and waiting parks on a condition variable without holding it.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    limits: QueueLimits,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: QueueLimits) -> Self {
        Self {
            state: Mutex::default(),
            not_empty: Condvar::new(),
            limits,
        }
    }

    /// Appends a message and wakes one waiter.
    ///
    /// Data messages over the pending limits are dropped. Control messages
    /// carry no payload and are always accepted so a waiting fetch still
    /// sees its sentinel.
    pub fn push(&self, item: Inbound) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if let Inbound::Data(env) = &item {
            let pending_msgs = state.items.len();
            let pending_bytes = state.pending_bytes;
            if pending_msgs >= self.limits.max_msgs
                || pending_bytes + env.payload_len() > self.limits.max_bytes
            {
                state.dropped += 1;
                return Err(QueueError::SlowConsumer {
                    pending_msgs,
                    pending_bytes,
                });
            }
        }
        state.pending_bytes += item.payload_len();
        state.delivered += 1;
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head of the queue, if any.
    pub fn pop(&self) -> Option<Inbound> {
        self.state.lock().pop_front()
    }

    /// Blocks until the queue is non-empty or `deadline` passes.
    ///
    /// Returns true if an item is available.
    pub fn wait_until_non_empty(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while state.items.is_empty() {
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return !state.items.is_empty();
            }
        }
        true
    }

    /// Waits like [`Self::wait_until_non_empty`] and pops under the same lock,
    /// so a concurrent consumer cannot take the item in between.
    pub fn pop_until(&self, deadline: Instant) -> Option<Inbound> {
        let mut state = self.state.lock();
        while state.items.is_empty() {
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Payload bytes currently queued.
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().pending_bytes
    }

    /// Messages accepted since creation.
    pub fn delivered(&self) -> u64 {
        self.state.lock().delivered
    }

    /// Messages dropped by the slow-consumer limits.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    pub fn limits(&self) -> QueueLimits {
        self.limits
    }
}
