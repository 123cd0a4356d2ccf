/* Copyright © 2018 Gianmarco Garrisi

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>. */

//! The event priority queue: a binary min-heap keyed on
//! `(time, priority_class, insertion_sequence)`.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::event::Event;

/// The two priority classes events may be scheduled with. `Urgent` events
/// fire before `Normal` events scheduled at the same `time`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    /// Fires first at a given `time`. Used for a Process's bootstrap
    /// `Initialize` event so the coroutine runs before time advances.
    Urgent = 0,
    /// The default priority class.
    #[default]
    Normal = 1,
}

#[derive(Clone)]
pub(crate) struct QueueItem {
    pub(crate) time: f64,
    pub(crate) priority: Priority,
    pub(crate) seq: u64,
    pub(crate) event: Event,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for QueueItem {}

impl QueueItem {
    fn key(&self) -> (f64, Priority, u64) {
        (self.time, self.priority, self.seq)
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // `time` compares with partial_cmp since f64 isn't Ord; a NaN
        // schedule time is a caller bug, not a condition we try to recover
        // from gracefully.
        match self.time.partial_cmp(&other.time) {
            Some(Ordering::Equal) | None => {
                (self.priority, self.seq).cmp(&(other.priority, other.seq))
            }
            Some(o) => o,
        }
    }
}

/// Ordered multiset of scheduled items. A thin wrapper over `BinaryHeap`
/// that inverts the ordering (we want the *earliest* item first) and
/// exposes only the operations the Environment needs.
#[derive(Default)]
pub(crate) struct PriorityQueue {
    heap: BinaryHeap<Reverse<QueueItem>>,
}

impl PriorityQueue {
    pub(crate) fn new() -> Self {
        PriorityQueue {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn push(&mut self, item: QueueItem) {
        self.heap.push(Reverse(item));
    }

    pub(crate) fn pop(&mut self) -> Option<QueueItem> {
        self.heap.pop().map(|Reverse(item)| item)
    }

    pub(crate) fn peek_time(&self) -> f64 {
        self.heap
            .peek()
            .map(|Reverse(item)| item.time)
            .unwrap_or(f64::INFINITY)
    }

    pub(crate) fn size(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    fn item(env: &Environment, time: f64, priority: Priority, seq: u64) -> QueueItem {
        QueueItem {
            time,
            priority,
            seq,
            event: Event::new(env),
        }
    }

    #[test]
    fn pops_earliest_time_first() {
        let env = Environment::new();
        let mut q = PriorityQueue::new();
        q.push(item(&env, 5.0, Priority::Normal, 0));
        q.push(item(&env, 1.0, Priority::Normal, 1));
        q.push(item(&env, 3.0, Priority::Normal, 2));
        assert_eq!(q.pop().unwrap().time, 1.0);
        assert_eq!(q.pop().unwrap().time, 3.0);
        assert_eq!(q.pop().unwrap().time, 5.0);
    }

    #[test]
    fn urgent_precedes_normal_at_equal_time() {
        let env = Environment::new();
        let mut q = PriorityQueue::new();
        q.push(item(&env, 1.0, Priority::Normal, 0));
        q.push(item(&env, 1.0, Priority::Urgent, 1));
        assert_eq!(q.pop().unwrap().priority, Priority::Urgent);
        assert_eq!(q.pop().unwrap().priority, Priority::Normal);
    }

    #[test]
    fn fifo_within_same_time_and_priority() {
        let env = Environment::new();
        let mut q = PriorityQueue::new();
        q.push(item(&env, 1.0, Priority::Normal, 2));
        q.push(item(&env, 1.0, Priority::Normal, 0));
        q.push(item(&env, 1.0, Priority::Normal, 1));
        assert_eq!(q.pop().unwrap().seq, 0);
        assert_eq!(q.pop().unwrap().seq, 1);
        assert_eq!(q.pop().unwrap().seq, 2);
    }

    #[test]
    fn peek_time_is_infinity_when_empty() {
        let q = PriorityQueue::new();
        assert_eq!(q.peek_time(), f64::INFINITY);
    }
}
