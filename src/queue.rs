// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Multi-producer / single-consumer queue bounded by summed element cost.
//
// Producers never block: an element that would push the summed cost past the
// budget is refused, not queued. The single consumer blocks while the queue
// is empty and the producer end is open, and drains whatever is left after a
// close.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};

/// Admission weight of a queued element. The recorder weighs packets by
/// message size so the queue bound is a byte budget.
pub trait Cost {
    fn cost(&self) -> usize;
}

/// Refused push. Carries the element back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
    Full(T),
    Closed(T),
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "queue cost budget exhausted"),
            Self::Closed(_) => write!(f, "queue producer end closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryPushError<T> {}

/// The producer end is closed and every queued element has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained;

impl fmt::Display for Drained {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue closed and fully drained")
    }
}

impl std::error::Error for Drained {}

struct Inner<T> {
    items: VecDeque<(T, usize)>,
    cost_sum: usize,
    closed: bool,
}

pub struct CostQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    max_cost: usize,
}

impl<T: Cost> CostQueue<T> {
    pub fn new(max_cost: usize) -> CostQueue<T> {
        CostQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                cost_sum: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            max_cost,
        }
    }

    /// Non-blocking admission. `Full` when the element's cost would push the
    /// summed cost past the budget, `Closed` after `close()`.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let cost = item.cost();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(TryPushError::Closed(item));
        }
        if inner.cost_sum + cost > self.max_cost {
            return Err(TryPushError::Full(item));
        }
        inner.cost_sum += cost;
        inner.items.push_back((item, cost));
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Consumer side. Blocks while the queue is empty and open; fails with
    /// `Drained` once the producer end is closed and the queue is empty.
    /// Otherwise pops FIFO into `out`: always at least one element, then as
    /// many more as keep the popped cost within `budget`.
    pub fn pop_many_up_to(&self, budget: usize, out: &mut Vec<T>) -> Result<(), Drained> {
        let mut inner = self.inner.lock();
        while inner.items.is_empty() {
            if inner.closed {
                return Err(Drained);
            }
            self.not_empty.wait(&mut inner);
        }

        let mut popped_cost = 0usize;
        loop {
            let front_cost = match inner.items.front() {
                Some((_, cost)) => *cost,
                None => break,
            };
            if popped_cost > 0 && popped_cost + front_cost > budget {
                break;
            }
            if let Some((item, cost)) = inner.items.pop_front() {
                inner.cost_sum -= cost;
                popped_cost += cost;
                out.push(item);
            }
        }
        Ok(())
    }

    /// Close the producer end. Idempotent; wakes a blocked consumer.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    /// Summed cost of currently queued elements.
    pub fn queue_depth(&self) -> usize {
        self.inner.lock().cost_sum
    }

    pub fn max_cost(&self) -> usize {
        self.max_cost
    }
}
