// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ISO-TP engine (C3): handler registry, outbound send, and inbound
//! dispatch.
//!
//! Reassembly of inbound First Frame / Consecutive Frame sequences is
//! intentionally not implemented on this generic path; only Single Frame
//! delivery and outbound session flow control are handled here. The OBD-II
//! decoder owns its own small FF/CF reassembly table for multi-frame
//! replies, kept local to that decoder rather than folded into this engine.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ISOTP_MAX_PAYLOAD;
use crate::frame_db::FlowControlSender;
use crate::isotp::pci::{self, Frame, FlowFlag};
use crate::isotp::session::{session_key, OutboundSession, SessionState};
use crate::{Error, Result};

/// Callback invoked for every Single Frame delivered to a registered
/// `(interface, can_id)` handler: `(interface, can_id, payload, timestamp)`.
pub type HandlerCallback = Arc<dyn Fn(&str, u32, &[u8], f64) + Send + Sync>;

struct HandlerEntry {
    id: String,
    callback: HandlerCallback,
}

/// ISO-TP segmentation/reassembly engine, shared across the CAN transport.
pub struct IsoTpEngine {
    handlers: Mutex<HashMap<(String, u32), Vec<HandlerEntry>>>,
    sessions: Mutex<HashMap<u64, OutboundSession>>,
}

impl Default for IsoTpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IsoTpEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for Single Frame deliveries on `(interface,
    /// can_id)`. `handler_id` identifies the caller for deduplication; a
    /// second registration with the same `(interface, can_id, handler_id)`
    /// is rejected and returns `false`.
    pub fn register_handler(
        &self,
        interface: &str,
        can_id: u32,
        handler_id: &str,
        callback: HandlerCallback,
    ) -> bool {
        let mut handlers = self.handlers.lock();
        let bucket = handlers
            .entry((interface.to_string(), can_id))
            .or_default();
        if bucket.iter().any(|h| h.id == handler_id) {
            return false;
        }
        bucket.push(HandlerEntry { id: handler_id.to_string(), callback });
        true
    }

    /// Send `payload` from `tx_id` to `rx_id` on `interface`, segmenting
    /// into FF+CFs if it does not fit a Single Frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if `payload` exceeds
    /// [`ISOTP_MAX_PAYLOAD`] bytes.
    pub fn send(
        &self,
        sender: &dyn FlowControlSender,
        interface: &str,
        tx_id: u32,
        rx_id: u32,
        payload: &[u8],
        when: f64,
    ) -> Result<bool> {
        if payload.len() > ISOTP_MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge(payload.len()));
        }
        if payload.len() < 8 {
            let ok = sender.send_raw(interface, tx_id, &pci::encode_single(payload));
            return Ok(ok);
        }

        let mut session = OutboundSession::new(interface, tx_id, rx_id, payload.to_vec(), when);
        let first_six = &session.payload[0..6];
        let ok = sender.send_raw(
            interface,
            tx_id,
            &pci::encode_first(session.payload.len() as u16, first_six),
        );
        if !ok {
            return Ok(false);
        }
        session.bytes_sent = 6;
        let key = session_key(interface, rx_id);
        self.sessions.lock().insert(key, session);
        log::debug!("isotp: session {key:#x} created on {interface} waiting for flow control");
        Ok(true)
    }

    /// Handle one inbound raw CAN frame addressed to this engine: dispatch
    /// Single Frame deliveries to registered handlers, and advance any
    /// outbound session matching a Flow Control reply.
    pub fn on_frame(
        &self,
        sender: &dyn FlowControlSender,
        interface: &str,
        can_id: u32,
        data: &[u8],
        when: f64,
    ) {
        let Some(frame) = pci::parse(data) else {
            log::debug!("isotp: malformed frame on {interface}:{can_id:#x}, dropping");
            return;
        };
        match frame {
            Frame::Single { payload } => self.dispatch(interface, can_id, &payload, when),
            Frame::FlowControl { flag, block_size, separation_time_raw } => {
                self.on_flow_control(sender, interface, can_id, flag, block_size, separation_time_raw, when);
            }
            Frame::First { .. } | Frame::Consecutive { .. } => {
                log::debug!(
                    "isotp: FF/CF on generic receive path for {interface}:{can_id:#x} not reassembled"
                );
            }
        }
    }

    fn dispatch(&self, interface: &str, can_id: u32, payload: &[u8], when: f64) {
        let handlers = self.handlers.lock();
        if let Some(bucket) = handlers.get(&(interface.to_string(), can_id)) {
            for entry in bucket {
                (entry.callback)(interface, can_id, payload, when);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_flow_control(
        &self,
        sender: &dyn FlowControlSender,
        interface: &str,
        can_id: u32,
        flag: FlowFlag,
        _block_size: u8,
        separation_time_raw: u8,
        when: f64,
    ) {
        let key = session_key(interface, can_id);
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(&key) else {
            log::debug!("isotp: flow control for unknown session {interface}:{can_id:#x}");
            return;
        };
        if session.interface != interface || session.rx_id != can_id {
            log::debug!("isotp: flow control session key mismatch, dropping session {key:#x}");
            sessions.remove(&key);
            return;
        }
        match flag {
            FlowFlag::Abort => {
                log::debug!("isotp: session {key:#x} aborted by peer");
                sessions.remove(&key);
            }
            FlowFlag::Wait => {
                session.last_sent_timestamp = when;
            }
            FlowFlag::ClearToSend => {
                session.separation_delay_ms = separation_time_raw;
                session.state = SessionState::Sending;
                session.last_sent_timestamp = when;
                let tx_id = session.tx_id;
                // The current implementation flushes every remaining CF
                // back-to-back, ignoring the negotiated separation time.
                while !session.is_complete() {
                    let chunk_len = session.remaining().len().min(7);
                    let chunk = session.remaining()[..chunk_len].to_vec();
                    let frame = pci::encode_consecutive(session.next_seq, &chunk);
                    sender.send_raw(interface, tx_id, &frame);
                    session.bytes_sent += chunk_len;
                    session.next_seq = (session.next_seq + 1) % 16;
                }
                log::debug!("isotp: session {key:#x} flushed, destroying");
                sessions.remove(&key);
            }
        }
    }

    /// Drop any outbound session that has been idle past `timeout_secs`
    /// since its last activity. Invoked once per CAN-reader loop iteration.
    pub fn session_tick(&self, now: f64, timeout_secs: f64) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|key, session| {
            let expired = session.is_expired(now, timeout_secs);
            if expired {
                log::warn!("isotp: session {key:#x} on {} timed out", session.interface);
            }
            !expired
        });
    }

    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingSender {
        sent: StdMutex<Vec<(u32, Vec<u8>)>>,
    }

    impl FlowControlSender for RecordingSender {
        fn send_raw(&self, _interface: &str, can_id: u32, data: &[u8]) -> bool {
            self.sent.lock().unwrap().push((can_id, data.to_vec()));
            true
        }
    }

    #[test]
    fn short_payload_sends_single_frame() {
        let engine = IsoTpEngine::new();
        let sender = RecordingSender { sent: StdMutex::new(Vec::new()) };
        engine.send(&sender, "can0", 0x6B0, 0x516, &[0x1A, 0x87], 0.0).unwrap();
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 0x6B0);
        assert_eq!(&sent[0].1[..3], &[0x02, 0x1A, 0x87]);
    }

    #[test]
    fn long_payload_waits_for_flow_control_then_flushes() {
        let engine = IsoTpEngine::new();
        let sender = RecordingSender { sent: StdMutex::new(Vec::new()) };
        let payload: Vec<u8> = (1..=12).collect();
        engine.send(&sender, "can0", 0x6B0, 0x516, &payload, 0.0).unwrap();
        assert_eq!(engine.session_count(), 1);
        {
            let sent = sender.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1, vec![0x10, 0x0C, 1, 2, 3, 4, 5, 6]);
        }

        let fc = pci::encode_flow_control_cts();
        engine.on_frame(&sender, "can0", 0x516, &fc, 1.0);
        assert_eq!(engine.session_count(), 0, "session must be destroyed after flush");
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, 0x6B0);
        assert_eq!(sent[1].1, vec![0x21, 7, 8, 9, 10, 11, 12, 0]);
    }

    #[test]
    fn single_frame_dispatches_to_handler() {
        let engine = IsoTpEngine::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        engine.register_handler(
            "can0",
            0x6B0,
            "test",
            Arc::new(move |_iface, _id, payload, _when| {
                assert_eq!(payload, &[0x1A, 0x87]);
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let sender = RecordingSender { sent: StdMutex::new(Vec::new()) };
        engine.on_frame(&sender, "can0", 0x6B0, &pci::encode_single(&[0x1A, 0x87]), 0.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_tick_drops_expired_sessions() {
        let engine = IsoTpEngine::new();
        let sender = RecordingSender { sent: StdMutex::new(Vec::new()) };
        let payload: Vec<u8> = (1..=12).collect();
        engine.send(&sender, "can0", 0x6B0, 0x516, &payload, 0.0).unwrap();
        assert_eq!(engine.session_count(), 1);
        engine.session_tick(0.5, 1.0);
        assert_eq!(engine.session_count(), 1, "not yet expired");
        engine.session_tick(2.0, 1.0);
        assert_eq!(engine.session_count(), 0, "expired session must be dropped");
    }
}
