//! Bounded queues for unsolicited device output.
//!
//! The read loop is the only producer. Under [`OverflowPolicy::Block`] a full
//! sink stalls the read loop until a subscriber drains it, which also stalls
//! delivery of every correlated response behind it. That is a liveness hazard
//! of the blocking policy, not a correctness bug: subscribers must keep up or
//! pick one of the dropping policies.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// What a push does when the sink is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for free space (backpressure on the read loop).
    #[default]
    Block,
    /// Evict the oldest queued record.
    DropOldest,
    /// Discard the incoming record.
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop_oldest" | "dropoldest" => Ok(OverflowPolicy::DropOldest),
            "drop_newest" | "dropnewest" => Ok(OverflowPolicy::DropNewest),
            other => Err(format!("unknown overflow policy '{other}'")),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Block => write!(f, "block"),
            OverflowPolicy::DropOldest => write!(f, "drop_oldest"),
            OverflowPolicy::DropNewest => write!(f, "drop_newest"),
        }
    }
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest record.
    DisplacedOldest,
    /// The pushed record was discarded.
    DroppedNewest,
}

/// An ordered, bounded queue of decoded records.
pub struct StreamSink<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    /// Signalled when a record is queued.
    items: Notify,
    /// Signalled when a record is taken.
    space: Notify,
    dropped: AtomicU64,
}

impl<T> StreamSink<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            items: Notify::new(),
            space: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Appends a record, applying the overflow policy when full.
    pub async fn push(&self, item: T) -> PushOutcome {
        loop {
            let space = self.space.notified();
            {
                let mut queue = self.queue.lock();
                if queue.len() < self.capacity {
                    queue.push_back(item);
                    drop(queue);
                    self.items.notify_one();
                    return PushOutcome::Queued;
                }

                match self.policy {
                    OverflowPolicy::DropNewest => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return PushOutcome::DroppedNewest;
                    }
                    OverflowPolicy::DropOldest => {
                        queue.pop_front();
                        queue.push_back(item);
                        drop(queue);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        self.items.notify_one();
                        return PushOutcome::DisplacedOldest;
                    }
                    OverflowPolicy::Block => {}
                }
            }
            space.await;
        }
    }

    /// Waits for the next record.
    pub async fn recv(&self) -> T {
        loop {
            let items = self.items.notified();
            if let Some(item) = self.try_recv() {
                return item;
            }
            items.await;
        }
    }

    /// Takes the next record if one is queued.
    pub fn try_recv(&self) -> Option<T> {
        let item = self.queue.lock().pop_front();
        if item.is_some() {
            self.space.notify_one();
        }
        item
    }

    /// Takes every queued record.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = self.queue.lock().drain(..).collect();
        if !items.is_empty() {
            self.space.notify_one();
        }
        items
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Number of records lost to the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
