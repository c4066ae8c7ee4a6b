// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OBD polling and periodic task scheduler (C5).
//!
//! Two independent ticks share one entry point, [`Scheduler::tick`],
//! invoked once per CAN-reader loop iteration: the OBD round-robin poll
//! and arbitrary periodic callbacks keyed by a caller-chosen id.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::OBD_BROADCAST_ID;
use crate::frame_db::{FlowControlSender, FrameDb};

/// One entry in the OBD poll map.
#[derive(Debug, Clone)]
struct PollEntry {
    request: Vec<u8>,
    repeat: bool,
}

/// A periodic task: fires `callback` whenever `period` has elapsed.
pub trait PeriodicTask: Send + Sync {
    /// Called when due. Returns an optional `(can_id, bytes)` to emit.
    fn run(&self, now: f64) -> Option<(u32, Vec<u8>)>;
}

struct PeriodicEntry {
    task: Arc<dyn PeriodicTask>,
    period_secs: f64,
    last_run: f64,
}

struct Inner {
    poll_map: HashMap<String, PollEntry>,
    poll_queue: VecDeque<String>,
    last_poll_tick: f64,
    periodic: HashMap<u64, PeriodicEntry>,
    next_periodic_id: u64,
}

/// OBD polling and periodic task scheduler.
pub struct Scheduler {
    inner: Mutex<Inner>,
    db: Arc<FrameDb>,
    poll_period_secs: f64,
}

impl Scheduler {
    #[must_use]
    pub fn new(db: Arc<FrameDb>) -> Self {
        Self::with_poll_period(db, 0.5)
    }

    #[must_use]
    pub fn with_poll_period(db: Arc<FrameDb>, poll_period_secs: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                poll_map: HashMap::new(),
                poll_queue: VecDeque::new(),
                last_poll_tick: 0.0,
                periodic: HashMap::new(),
                next_periodic_id: 1,
            }),
            db,
            poll_period_secs,
        }
    }

    /// Register a repeating poll entry for `key` using the request
    /// template from its registered schema (built at schema-registration
    /// time from the recognized PID tables). No-op if `key` has no
    /// `obd_request` template or is already registered.
    pub fn request_polling(&self, key: &str) -> bool {
        let Some(schema) = self.db.schema(key) else {
            log::warn!("scheduler: request_polling on unregistered key '{key}'");
            return false;
        };
        let Some(request) = schema.obd_request else {
            log::warn!("scheduler: '{key}' has no OBD request template");
            return false;
        };
        let mut inner = self.inner.lock();
        inner.poll_map.insert(key.to_string(), PollEntry { request, repeat: true });
        true
    }

    /// Remove `key` from the poll map.
    pub fn cancel_polling(&self, key: &str) {
        self.inner.lock().poll_map.remove(key);
    }

    /// Enqueue a one-shot OBD request with a synthetic key.
    pub fn queue_obd(&self, bytes: Vec<u8>) {
        let mut inner = self.inner.lock();
        let key = format!("__oneshot_{}", inner.poll_map.len() + inner.poll_queue.len());
        inner.poll_map.insert(key.clone(), PollEntry { request: bytes, repeat: false });
        inner.poll_queue.push_back(key);
    }

    /// Enqueue the fixed DTC-erase request `{0x01, 0x04}`.
    pub fn send_dtc_erase(&self) {
        self.queue_obd(vec![0x01, 0x04]);
    }

    /// Register a periodic task, returning its id for later cancellation.
    pub fn add_periodic(&self, task: Arc<dyn PeriodicTask>, period_secs: f64) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_periodic_id;
        inner.next_periodic_id += 1;
        inner.periodic.insert(id, PeriodicEntry { task, period_secs, last_run: 0.0 });
        id
    }

    /// Cancel a periodic task by id.
    pub fn cancel_periodic(&self, id: u64) {
        self.inner.lock().periodic.remove(&id);
    }

    /// Run both ticks. Invoked once per CAN-reader loop iteration.
    pub fn tick(&self, now: f64, sender: &dyn FlowControlSender) {
        self.obd_tick(now, sender);
        self.periodic_tick(now, sender);
    }

    fn obd_tick(&self, now: f64, sender: &dyn FlowControlSender) {
        let pollable_interfaces = self.db.pollable_interfaces();
        if pollable_interfaces.is_empty() {
            return;
        }

        let mut inner = self.inner.lock();
        if now - inner.last_poll_tick < self.poll_period_secs {
            return;
        }
        inner.last_poll_tick = now;

        for interface in &pollable_interfaces {
            if inner.poll_queue.is_empty() {
                inner.poll_queue.extend(inner.poll_map.keys().cloned());
            }
            let Some(key) = inner.poll_queue.pop_front() else { continue };
            let Some(entry) = inner.poll_map.get(&key).cloned() else { continue };
            sender.send_raw(interface, OBD_BROADCAST_ID, &entry.request);
            if !entry.repeat {
                inner.poll_map.remove(&key);
            }
        }
    }

    fn periodic_tick(&self, now: f64, sender: &dyn FlowControlSender) {
        let mut inner = self.inner.lock();
        let due: Vec<u64> = inner
            .periodic
            .iter()
            .filter(|(_, e)| now - e.last_run >= e.period_secs)
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(entry) = inner.periodic.get_mut(&id) else { continue };
            entry.last_run = now;
            let task = entry.task.clone();
            if let Some((can_id, bytes)) = task.run(now) {
                // Periodic tasks are not tied to a single interface; callers
                // that need one should route through the frame database's
                // pollable-interface list themselves inside the callback.
                for interface in self.db.pollable_interfaces() {
                    sender.send_raw(&interface, can_id, &bytes);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_db::{NullSender, Schema, Units};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSender {
        count: AtomicUsize,
    }

    impl FlowControlSender for RecordingSender {
        fn send_raw(&self, _interface: &str, _can_id: u32, _data: &[u8]) -> bool {
            self.count.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn request_polling_requires_schema_with_template() {
        let db = Arc::new(FrameDb::new());
        let scheduler = Scheduler::new(db.clone());
        assert!(!scheduler.request_polling("MISSING"));

        db.add_schema("ENGINE_RPM", Schema::new("RPM", "Engine RPM", Units::Rpm).with_obd_request(vec![0x01, 0x0C]));
        assert!(scheduler.request_polling("ENGINE_RPM"));
    }

    #[test]
    fn queue_obd_is_one_shot() {
        let db = Arc::new(FrameDb::new());
        let scheduler = Scheduler::with_poll_period(db, 0.0);
        scheduler.queue_obd(vec![0x01, 0x04]);
        let sender = NullSender;
        // No pollable interfaces registered, so nothing fires yet.
        scheduler.tick(0.0, &sender);
    }

    #[test]
    fn send_dtc_erase_uses_fixed_payload() {
        let db = Arc::new(FrameDb::new());
        let scheduler = Scheduler::new(db);
        scheduler.send_dtc_erase();
        let inner = scheduler.inner.lock();
        assert!(inner.poll_map.values().any(|e| e.request == vec![0x01, 0x04]));
    }

    #[test]
    fn periodic_task_fires_after_period_elapses() {
        let db = Arc::new(FrameDb::new());
        let scheduler = Scheduler::new(db);
        struct Once(AtomicUsize);
        impl PeriodicTask for Once {
            fn run(&self, _now: f64) -> Option<(u32, Vec<u8>)> {
                self.0.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
        let task = Arc::new(Once(AtomicUsize::new(0)));
        scheduler.add_periodic(task.clone(), 1.0);
        let sender = RecordingSender { count: AtomicUsize::new(0) };
        scheduler.periodic_tick(0.5, &sender);
        assert_eq!(task.0.load(Ordering::SeqCst), 0);
        scheduler.periodic_tick(1.0, &sender);
        assert_eq!(task.0.load(Ordering::SeqCst), 1);
    }
}
