// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! numerus-bus: the in-process Event Bus (C2, `spec.md` §4.6).
//!
//! Per `spec.md` §9 "Global event bus": the source exposes a process-wide
//! singleton; this crate instead provides a `Bus` value constructed once
//! (at job-runner construction) and passed by reference to every
//! component that needs it. Process-wide access, where external tooling
//! needs it, is the daemon's job — a single root holder, not ambient state.

mod pattern;

use std::sync::atomic::{AtomicU64, Ordering};

use numerus_core::Event;
use parking_lot::Mutex;
use pattern::Pattern;
use tokio::sync::mpsc;

/// Default per-subscriber buffer depth. `spec.md` §2 describes "per-subscriber
/// buffering"; a subscriber that falls behind this far is almost certainly
/// gone, so the bus drops it rather than applying its own backpressure —
/// bounded queueing belongs to the Terminal Manager (`spec.md` §4.3), which
/// has an explicit overflow contract. The bus's job is ordered delivery, not
/// flow control.
const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

struct Subscription {
    id: u64,
    pattern: Pattern,
    sender: mpsc::Sender<Event>,
}

/// In-process topic pub/sub bus.
///
/// Cheaply cloneable: internally an `Arc`-free `Mutex<Vec<Subscription>>`
/// wrapped by the caller in whatever sharing story it needs (the runner
/// holds one `Bus` per process and passes `&Bus` down, per the §9 note).
#[derive(Default)]
pub struct Bus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

/// A handle returned by [`Bus::subscribe`]; dropping it does not
/// unsubscribe — call [`Subscription::unsubscribe`] (the Store/Journal
/// hold subscriptions for the process lifetime and never need to).
pub struct SubscriptionHandle {
    id: u64,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a dotted topic pattern (`job.*`, `terminal.stdout`, ...).
    /// Returns the receiving end and a handle usable with [`Bus::unsubscribe`].
    pub fn subscribe(&self, topic_pattern: &str) -> (SubscriptionHandle, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(DEFAULT_SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().push(Subscription { id, pattern: Pattern::new(topic_pattern), sender });
        (SubscriptionHandle { id }, receiver)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscriptions.lock().retain(|s| s.id != handle.id);
    }

    /// Publish `event` under its own topic (`Event::topic`). Subscribers
    /// receive events in publish order per topic (`spec.md` §4.6) because
    /// each subscriber's `mpsc::Sender` preserves send order and this
    /// method iterates and sends synchronously under the subscription lock.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        let mut dead = Vec::new();
        {
            let subscriptions = self.subscriptions.lock();
            for sub in subscriptions.iter() {
                if !sub.pattern.matches(&topic) {
                    continue;
                }
                if sub.sender.try_send(event.clone()).is_err() {
                    // Receiver dropped or its buffer is full; either way this
                    // subscriber can no longer make progress on this bus.
                    tracing::warn!(topic = %topic, subscriber = sub.id, "bus subscriber dropped event, unsubscribing");
                    dead.push(sub.id);
                }
            }
        }
        if !dead.is_empty() {
            self.subscriptions.lock().retain(|s| !dead.contains(&s.id));
        }
    }
}
