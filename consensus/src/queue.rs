// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

use tracing::warn;

use crate::config;

/// A queue for events parked for a future (round, step). Bounded by
/// `CONSENSUS_QUEUE_LIMIT`; events above the limit are dropped.
#[derive(Debug)]
pub struct Queue<T: Debug + Clone> {
    events: BTreeMap<u64, BTreeMap<u8, VecDeque<T>>>,
    size: usize,
    capacity: usize,
}

impl<T: Debug + Clone> Default for Queue<T> {
    fn default() -> Self {
        Self {
            events: BTreeMap::new(),
            size: 0,
            capacity: config::CONSENSUS_QUEUE_LIMIT,
        }
    }
}

impl<T: Debug + Clone> Queue<T> {
    pub fn put_event(&mut self, round: u64, step: u8, msg: T) {
        if self.size >= self.capacity {
            warn!(event = "future queue full, event dropped", round, step);
            return;
        }

        self.events
            .entry(round)
            .or_default()
            .entry(step)
            .or_default()
            .push_back(msg);

        self.size += 1;
    }

    /// Takes out all events parked for the specified (round, step), in
    /// arrival order.
    pub fn drain_events(&mut self, round: u64, step: u8) -> Option<VecDeque<T>> {
        let steps = self.events.get_mut(&round)?;
        let drained = steps.remove(&step)?;

        self.size -= drained.len();
        Some(drained)
    }

    /// Removes all events parked for rounds up to and including `round`.
    pub fn clear_round(&mut self, round: u64) {
        let kept = self.events.split_off(&(round + 1));
        self.events = kept;

        self.size = self
            .events
            .values()
            .flat_map(|steps| steps.values())
            .map(VecDeque::len)
            .sum();
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_event() {
        let round = 55555;

        let mut queue = Queue::<i32>::default();
        queue.put_event(round, 2, 5);
        queue.put_event(round, 2, 4);
        queue.put_event(round, 2, 3);

        assert!(queue.drain_events(round, 3).is_none());
        assert!(queue.drain_events(4444, 2).is_none());

        for i in 1..100u8 {
            queue.put_event(4444, i, i as i32);
        }

        assert_eq!(
            queue.drain_events(round, 2).unwrap(),
            VecDeque::from([5, 4, 3]),
        );

        // Drained events are consumed
        assert!(queue.drain_events(round, 2).is_none());
    }

    #[test]
    fn test_clear_round() {
        let mut queue = Queue::<i32>::default();
        queue.put_event(1, 1, 1);
        queue.put_event(2, 1, 2);
        queue.put_event(3, 1, 3);

        queue.clear_round(2);

        assert!(queue.drain_events(1, 1).is_none());
        assert!(queue.drain_events(2, 1).is_none());
        assert_eq!(queue.drain_events(3, 1).unwrap(), VecDeque::from([3]));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let mut queue = Queue::<u64>::default();
        queue.capacity = 2;

        queue.put_event(1, 1, 1);
        queue.put_event(1, 1, 2);
        queue.put_event(1, 1, 3);

        assert_eq!(queue.drain_events(1, 1).unwrap(), VecDeque::from([1, 2]));
    }
}
