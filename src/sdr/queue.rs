// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded sample queue (C9): single-producer/single-consumer by
//! convention, moving `Vec<T>` blocks between SDR pipeline stages.
//!
//! `push` notifies a single waiter; only `push_end` and `flush` notify
//! every waiter. Single-producer/single-consumer queues never have more
//! than one blocked waiter in practice, so the two policies are
//! observationally identical here, but `notify_one` is the documented
//! contract and the one exercised by tests.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    queue: VecDeque<Vec<T>>,
    total: usize,
    end_marked: bool,
}

/// A bounded FIFO of sample blocks moved between SDR pipeline threads.
pub struct SampleQueue<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

impl<T> Default for SampleQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SampleQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { queue: VecDeque::new(), total: 0, end_marked: false }),
            cond: Condvar::new(),
        }
    }

    /// Enqueue `samples` if non-empty. Debug-asserts that `push_end` has
    /// not already been called, matching the teacher's convention of
    /// asserting internal invariants rather than panicking in release.
    pub fn push(&self, samples: Vec<T>) {
        if samples.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        debug_assert!(!inner.end_marked, "push after push_end");
        inner.total += samples.len();
        inner.queue.push_back(samples);
        drop(inner);
        self.cond.notify_one();
    }

    /// Mark the stream's sticky end. No further `push` is legal.
    pub fn push_end(&self) {
        let mut inner = self.inner.lock();
        inner.end_marked = true;
        drop(inner);
        self.cond.notify_all();
    }

    /// Current total queued element count across all pending blocks.
    #[must_use]
    pub fn queued_samples(&self) -> usize {
        self.inner.lock().total
    }

    /// Block until the queue is non-empty or the end marker is set, then
    /// dequeue one block. Returns an empty vector once the end is reached.
    pub fn pull(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        while inner.queue.is_empty() && !inner.end_marked {
            self.cond.wait(&mut inner);
        }
        match inner.queue.pop_front() {
            Some(block) => {
                inner.total -= block.len();
                block
            }
            None => Vec::new(),
        }
    }

    /// Block until at least `min` samples are queued or the end is set.
    pub fn wait_buffer_fill(&self, min: usize) {
        let mut inner = self.inner.lock();
        while inner.total < min && !inner.end_marked {
            self.cond.wait(&mut inner);
        }
    }

    /// Discard all pending blocks. Does not set the end marker.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.total = 0;
        drop(inner);
        self.cond.notify_all();
    }

    /// True once the queue is drained and the end marker has been set.
    #[must_use]
    pub fn pull_end_reached(&self) -> bool {
        let inner = self.inner.lock();
        inner.total == 0 && inner.end_marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_then_pull_round_trips() {
        let q: SampleQueue<i32> = SampleQueue::new();
        q.push(vec![1, 2, 3]);
        assert_eq!(q.queued_samples(), 3);
        let block = q.pull();
        assert_eq!(block, vec![1, 2, 3]);
        assert_eq!(q.queued_samples(), 0);
    }

    #[test]
    fn pull_blocks_until_push_wakes_it() {
        let q = Arc::new(SampleQueue::<i32>::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pull());
        thread::sleep(Duration::from_millis(20));
        q.push(vec![7]);
        let got = handle.join().unwrap();
        assert_eq!(got, vec![7]);
    }

    #[test]
    fn pull_returns_empty_on_end_with_no_data() {
        let q: SampleQueue<i32> = SampleQueue::new();
        q.push_end();
        assert_eq!(q.pull(), Vec::<i32>::new());
        assert!(q.pull_end_reached());
    }

    #[test]
    fn flush_clears_queue_without_marking_end() {
        let q: SampleQueue<i32> = SampleQueue::new();
        q.push(vec![1, 2]);
        q.flush();
        assert_eq!(q.queued_samples(), 0);
        assert!(!q.pull_end_reached());
    }

    #[test]
    fn wait_buffer_fill_returns_once_threshold_met() {
        let q = Arc::new(SampleQueue::<i32>::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            q2.wait_buffer_fill(5);
        });
        q.push(vec![1, 2]);
        thread::sleep(Duration::from_millis(10));
        q.push(vec![3, 4, 5]);
        handle.join().unwrap();
    }
}
