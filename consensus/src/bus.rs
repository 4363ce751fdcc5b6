// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_channel::TrySendError;
use node_data::message::{AsyncQueue, Message, Topics};
use tokio::sync::RwLock;
use tracing::warn;

use crate::config;

/// In-process topic-addressed broadcast of consensus messages.
///
/// Delivery is per-publisher FIFO within a topic. The bus keeps weak
/// references only; a subscription is dropped from the routing table once
/// its owner goes away. A full subscriber queue drops the message and
/// bumps the subscriber's overflow counter.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<u8, Vec<Weak<Subscription>>>>,
}

pub struct Subscription {
    queue: AsyncQueue<Message>,
    overflow: AtomicU64,
}

impl Subscription {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: AsyncQueue::bounded(capacity),
            overflow: AtomicU64::new(0),
        })
    }

    pub fn recv(&self) -> async_channel::Recv<'_, Message> {
        self.queue.recv()
    }

    /// Count of messages dropped because this subscriber lagged behind.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber queue for the given topics. The returned
    /// handle owns the queue; dropping it unsubscribes.
    pub async fn subscribe(&self, topics: &[Topics]) -> Arc<Subscription> {
        self.subscribe_with_capacity(topics, config::CONSENSUS_BUS_CAP)
            .await
    }

    pub async fn subscribe_with_capacity(
        &self,
        topics: &[Topics],
        capacity: usize,
    ) -> Arc<Subscription> {
        let sub = Subscription::new(capacity);

        let mut guard = self.subscribers.write().await;
        for topic in topics {
            guard
                .entry(*topic as u8)
                .or_default()
                .push(Arc::downgrade(&sub));
        }

        sub
    }

    /// Routes a message to every live subscriber of its topic.
    pub async fn publish(&self, msg: Message) {
        let mut guard = self.subscribers.write().await;

        let subs = match guard.get_mut(&msg.header.topic) {
            Some(subs) => subs,
            None => return,
        };

        subs.retain(|weak| {
            let sub = match weak.upgrade() {
                Some(sub) => sub,
                None => return false,
            };

            match sub.queue.try_send(msg.clone()) {
                Ok(_) => true,
                Err(TrySendError::Full(_)) => {
                    sub.overflow.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event = "subscriber queue full, message dropped",
                        topic = msg.header.topic,
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }
}
