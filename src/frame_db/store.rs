// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The pub/sub frame and value store (C1).
//!
//! A single [`parking_lot::Mutex`] guards every mutating and reading
//! operation, matching the concurrency policy in the component design:
//! contention is low because decoders publish from the CAN reader thread.
//! `save_frame` narrows its critical section to the frame-cache update so
//! that decoder callbacks (which themselves call back into `update_value`)
//! never re-enter the same lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame_db::types::{CachedFrameEntry, CanFrame, FrameTag, Schema, Value};
use crate::{Error, Result};

/// Capability passed into decoders that need to answer with an ISO-TP flow
/// control frame (the OBD decoder's FF reassembly path). Kept as a narrow
/// trait object rather than a back-pointer to the whole transport, per the
/// cyclic-reference design note.
pub trait FlowControlSender: Send + Sync {
    /// Send a raw CAN frame on `interface`. Returns `true` on success.
    fn send_raw(&self, interface: &str, can_id: u32, data: &[u8]) -> bool;
}

/// A no-op sender for contexts (tests, decoders with no transport wired)
/// that never need to answer with flow control.
pub struct NullSender;

impl FlowControlSender for NullSender {
    fn send_raw(&self, _interface: &str, _can_id: u32, _data: &[u8]) -> bool {
        false
    }
}

/// Capability set implemented by every protocol decoder (C2).
///
/// Modeled as a trait rather than a class hierarchy per the design note:
/// no multi-level inheritance is needed, just this flat set of operations.
pub trait ProtocolDecoder: Send + Sync {
    /// Register this decoder's value schemas with the database.
    fn register_schema(&self, db: &FrameDb);
    /// Reset any internal reassembly state (e.g. a partial VIN accumulator).
    fn reset(&self);
    /// Handle one frame arriving on `interface`.
    fn process_frame(
        &self,
        db: &FrameDb,
        interface: &str,
        frame: &CanFrame,
        when: f64,
        send: &dyn FlowControlSender,
    );
    /// Human-readable description of a known frame, for diagnostics.
    fn describe_frame(&self, frame: &CanFrame) -> Option<String>;
    /// True if this decoder wants to participate in OBD polling round-robin.
    fn can_be_polled(&self) -> bool {
        false
    }
}

struct InterfaceRecord {
    #[allow(dead_code)] // retained for parity with the source's stable per-process ordinal
    tag: u8,
    decoders: Vec<Arc<dyn ProtocolDecoder>>,
    frames: HashMap<u32, CachedFrameEntry>,
}

struct Inner {
    interfaces: HashMap<String, InterfaceRecord>,
    schemas: HashMap<String, Schema>,
    values: HashMap<String, Value>,
    frame_epoch: u64,
    value_epoch: u64,
    next_interface_tag: u8,
}

/// The frame and value database (C1).
pub struct FrameDb {
    inner: Mutex<Inner>,
}

impl Default for FrameDb {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDb {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                interfaces: HashMap::new(),
                schemas: HashMap::new(),
                values: HashMap::new(),
                frame_epoch: 0,
                value_epoch: 0,
                next_interface_tag: 0,
            }),
        }
    }

    /// Idempotent per `(interface, decoder)`. Returns `false` if this exact
    /// decoder (by pointer identity) is already attached to `interface`.
    pub fn register_protocol(&self, interface: &str, decoder: Arc<dyn ProtocolDecoder>) -> bool {
        let mut inner = self.inner.lock();
        let tag = inner.next_interface_tag;
        let record = inner
            .interfaces
            .entry(interface.to_string())
            .or_insert_with(|| {
                let rec = InterfaceRecord {
                    tag,
                    decoders: Vec::new(),
                    frames: HashMap::new(),
                };
                rec
            });
        if record
            .decoders
            .iter()
            .any(|d| Arc::ptr_eq(d, &decoder))
        {
            return false;
        }
        let is_new_interface = record.decoders.is_empty() && record.frames.is_empty();
        record.decoders.push(decoder.clone());
        if is_new_interface {
            inner.next_interface_tag = inner.next_interface_tag.wrapping_add(1);
        }
        drop(inner);
        decoder.register_schema(self);
        true
    }

    /// Register a value key. Idempotent: a second call with the same key
    /// is a no-op. Returns `true` if this call newly registered the key.
    pub fn add_schema(&self, key: &str, schema: Schema) -> bool {
        let mut inner = self.inner.lock();
        if inner.schemas.contains_key(key) {
            return false;
        }
        inner.schemas.insert(key.to_string(), schema);
        true
    }

    /// Look up the registered schema for a key.
    #[must_use]
    pub fn schema(&self, key: &str) -> Option<Schema> {
        self.inner.lock().schemas.get(key).cloned()
    }

    /// Writes iff the value differs from the most recent one for `key`.
    /// Unregistered keys are logged, not rejected.
    pub fn update_value(&self, key: &str, value: impl Into<String>, when: f64) {
        let value = value.into();
        let trimmed = value.trim();
        let mut inner = self.inner.lock();
        if !inner.schemas.contains_key(key) {
            log::warn!("update_value: schema-unknown key '{key}'");
        }
        let units = inner
            .schemas
            .get(key)
            .map_or(crate::frame_db::types::Units::Unknown, |s| s.units);
        let unchanged = inner
            .values
            .get(key)
            .is_some_and(|existing| existing.value == trimmed);
        if unchanged {
            return;
        }
        inner.value_epoch += 1;
        let epoch = inner.value_epoch;
        inner.values.insert(
            key.to_string(),
            Value {
                key: key.to_string(),
                units,
                last_update: when,
                epoch,
                value: trimmed.to_string(),
            },
        );
    }

    /// Current value for `key`, if any has ever been written.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner.lock().values.get(key).cloned()
    }

    /// Updates or inserts the cached entry for `(interface, frame.can_id)`,
    /// diffs against the prior entry, and dispatches to attached decoders
    /// on insert or on any byte change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlankInterface`] if `interface` is empty.
    pub fn save_frame(
        &self,
        interface: &str,
        frame: CanFrame,
        timestamp: f64,
        send: &dyn FlowControlSender,
    ) -> Result<()> {
        if interface.is_empty() {
            return Err(Error::BlankInterface);
        }

        let (should_dispatch, decoders) = {
            let mut inner = self.inner.lock();
            inner.frame_epoch += 1;
            let epoch = inner.frame_epoch;
            let tag = inner.next_interface_tag;
            let record = inner
                .interfaces
                .entry(interface.to_string())
                .or_insert_with(|| InterfaceRecord {
                    tag,
                    decoders: Vec::new(),
                    frames: HashMap::new(),
                });

            let can_id = frame.can_id;
            let (is_new, changed_mask) = match record.frames.get(&can_id) {
                None => (true, 0xFFu8),
                Some(prior) => {
                    if prior.frame.dlc() != frame.dlc() {
                        let max_dlc = prior.frame.dlc().max(frame.dlc());
                        let mask = if max_dlc >= 8 { 0xFFu8 } else { (1u8 << max_dlc) - 1 };
                        (false, mask)
                    } else {
                        let mut mask = 0u8;
                        for (i, (a, b)) in prior.frame.data.iter().zip(frame.data.iter()).enumerate()
                        {
                            if a != b && i < 8 {
                                mask |= 1 << i;
                            }
                        }
                        (false, mask)
                    }
                }
            };
            let changed = changed_mask != 0;

            let prev_timestamp = record
                .frames
                .get(&can_id)
                .map_or(timestamp, |p| p.last_rx_timestamp);
            let prev_avg = record
                .frames
                .get(&can_id)
                .map_or(0.0, |p| p.rolling_average_interval);
            let new_avg = ((timestamp - prev_timestamp) + prev_avg) / 2.0;

            let entry = record.frames.entry(can_id).or_insert_with(|| CachedFrameEntry {
                frame: frame.clone(),
                last_rx_timestamp: timestamp,
                rolling_average_interval: 0.0,
                last_change_epoch: 0,
                wall_clock_update_time: timestamp,
                changed_mask: 0,
            });
            entry.last_rx_timestamp = timestamp;
            entry.rolling_average_interval = new_avg;
            if is_new || changed {
                entry.frame = frame.clone();
                entry.last_change_epoch = epoch;
                entry.wall_clock_update_time = timestamp;
                entry.changed_mask = changed_mask;
            }

            if is_new || changed {
                (true, record.decoders.clone())
            } else {
                (false, Vec::new())
            }
        };

        if should_dispatch {
            for decoder in &decoders {
                decoder.process_frame(self, interface, &frame, timestamp, send);
            }
        }
        Ok(())
    }

    /// Returns tags for all cached frames on `interface` (or every
    /// interface if `None`) whose `last_change_epoch <= epoch`, plus the
    /// current frame epoch. Preserves the source's `<=` "since" semantics
    /// verbatim (see design notes): this is *not* "changed after `epoch`".
    #[must_use]
    pub fn frames_since(&self, interface: Option<&str>, epoch: u64) -> (Vec<FrameTag>, u64) {
        let inner = self.inner.lock();
        let mut tags = Vec::new();
        for (_name, record) in inner
            .interfaces
            .iter()
            .filter(|(name, _)| interface.is_none_or(|want| want == name.as_str()))
        {
            for (can_id, entry) in &record.frames {
                if entry.last_change_epoch <= epoch {
                    tags.push(FrameTag::make(record.tag, *can_id));
                }
            }
        }
        (tags, inner.frame_epoch)
    }

    /// Same `<=` semantics as [`FrameDb::frames_since`], for values.
    #[must_use]
    pub fn values_since(&self, epoch: u64) -> (Vec<String>, u64) {
        let inner = self.inner.lock();
        let keys = inner
            .values
            .values()
            .filter(|v| v.epoch <= epoch)
            .map(|v| v.key.clone())
            .collect();
        (keys, inner.value_epoch)
    }

    /// True if any decoder attached to `interface` declares itself pollable.
    #[must_use]
    pub fn interface_is_pollable(&self, interface: &str) -> bool {
        self.inner
            .lock()
            .interfaces
            .get(interface)
            .is_some_and(|rec| rec.decoders.iter().any(|d| d.can_be_polled()))
    }

    /// All interface names with at least one pollable decoder attached.
    #[must_use]
    pub fn pollable_interfaces(&self) -> Vec<String> {
        self.inner
            .lock()
            .interfaces
            .iter()
            .filter(|(_, rec)| rec.decoders.iter().any(|d| d.can_be_polled()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Total cached frame count across all interfaces.
    #[must_use]
    pub fn frames_count(&self) -> usize {
        self.inner.lock().interfaces.values().map(|r| r.frames.len()).sum()
    }

    /// Drop every cached frame on every interface. Schemas/values survive.
    pub fn clear_frames(&self) {
        for record in self.inner.lock().interfaces.values_mut() {
            record.frames.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_db::types::Units;

    struct CountingDecoder {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ProtocolDecoder for CountingDecoder {
        fn register_schema(&self, db: &FrameDb) {
            db.add_schema("TEST_KEY", Schema::new("Test", "A test value", Units::Int));
        }
        fn reset(&self) {}
        fn process_frame(
            &self,
            db: &FrameDb,
            _interface: &str,
            frame: &CanFrame,
            when: f64,
            _send: &dyn FlowControlSender,
        ) {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            db.update_value("TEST_KEY", frame.data[0].to_string(), when);
        }
        fn describe_frame(&self, _frame: &CanFrame) -> Option<String> {
            None
        }
    }

    #[test]
    fn save_frame_dispatches_only_on_change() {
        let db = FrameDb::new();
        let decoder = Arc::new(CountingDecoder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        assert!(db.register_protocol("can0", decoder.clone()));
        assert!(!db.register_protocol("can0", decoder.clone()));

        let sender = NullSender;
        db.save_frame("can0", CanFrame::new(0x100, vec![1, 2, 3]), 1.0, &sender)
            .unwrap();
        db.save_frame("can0", CanFrame::new(0x100, vec![1, 2, 3]), 2.0, &sender)
            .unwrap();
        db.save_frame("can0", CanFrame::new(0x100, vec![1, 2, 9]), 3.0, &sender)
            .unwrap();

        assert_eq!(decoder.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(db.value("TEST_KEY").unwrap().value, "9");
    }

    #[test]
    fn save_frame_rejects_blank_interface() {
        let db = FrameDb::new();
        let sender = NullSender;
        let err = db
            .save_frame("", CanFrame::new(0x100, vec![1]), 1.0, &sender)
            .unwrap_err();
        assert!(matches!(err, Error::BlankInterface));
    }

    #[test]
    fn frames_since_uses_le_semantics() {
        let db = FrameDb::new();
        let decoder = Arc::new(CountingDecoder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        db.register_protocol("can0", decoder);
        let sender = NullSender;
        db.save_frame("can0", CanFrame::new(0x200, vec![1]), 1.0, &sender)
            .unwrap();
        let (tags, epoch) = db.frames_since(Some("can0"), 0);
        assert_eq!(tags.len(), 1);
        let (tags_incl, _) = db.frames_since(Some("can0"), epoch);
        assert_eq!(tags_incl.len(), 1, "<= epoch must include the frame at exactly epoch");
    }

    #[test]
    fn update_value_is_idempotent_on_same_value() {
        let db = FrameDb::new();
        db.add_schema("K", Schema::new("K", "k", Units::Int));
        db.update_value("K", "5", 1.0);
        let e1 = db.value("K").unwrap().epoch;
        db.update_value("K", "5", 2.0);
        let e2 = db.value("K").unwrap().epoch;
        assert_eq!(e1, e2, "writing the same value must not advance the epoch");
        db.update_value("K", "6", 3.0);
        let e3 = db.value("K").unwrap().epoch;
        assert!(e3 > e2);
    }

    #[test]
    fn dlc_mismatch_sets_mask_up_to_the_wider_dlc() {
        let db = FrameDb::new();
        let sender = NullSender;
        db.save_frame("can0", CanFrame::new(0x300, vec![1, 2, 3]), 1.0, &sender).unwrap();
        db.save_frame("can0", CanFrame::new(0x300, vec![1, 2, 3, 4, 5]), 2.0, &sender).unwrap();

        let inner = db.inner.lock();
        let entry = &inner.interfaces["can0"].frames[&0x300];
        assert_eq!(entry.changed_mask, 0x1F, "old_dlc=3, new_dlc=5 should mask bits 0..=4");
    }
}
