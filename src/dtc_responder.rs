// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DTC responder (C6): impersonates the Jeep's factory radio module,
//! answering the instrument cluster's diagnostic queries at `0x6B0`/`0x516`.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{JEEP_RADIO_REPLY_ID, JEEP_RADIO_REQUEST_ID};
use crate::frame_db::FlowControlSender;
use crate::isotp::IsoTpEngine;

const SERVICE_HEARTBEAT: u8 = 0x3E;
const SERVICE_MODULE_ID: u8 = 0x1A;
const SERVICE_DTCS_BY_STATUS: u8 = 0x18;
const SERVICE_READ_DATA_BY_LOCAL_ID: u8 = 0x21;

/// Snapshot of the values the PID `0x21` sub-table derives from the radio
/// supervisor. Canned defaults are used where no supervisor is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadioSnapshot {
    pub signal_strength: u8,
    pub mode_word: u8,
    pub equalizer_word: u8,
    pub frequency_hz: u32,
}

/// Impersonates the factory radio module on the Jeep body bus.
pub struct DtcResponder {
    snapshot: RwLock<RadioSnapshot>,
}

impl Default for DtcResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl DtcResponder {
    #[must_use]
    pub fn new() -> Self {
        Self { snapshot: RwLock::new(RadioSnapshot::default()) }
    }

    /// Update the radio-state snapshot the PID `0x21` sub-table reads from.
    pub fn update_snapshot(&self, snapshot: RadioSnapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Register this responder's ISO-TP handler for `0x6B0` on `interface`.
    ///
    /// `engine` and `sender` are captured by the registered closure so that
    /// replies can be sent from within the ISO-TP engine's own dispatch
    /// path, without threading either through the handler callback type.
    pub fn attach(
        self: &Arc<Self>,
        engine: Arc<IsoTpEngine>,
        sender: Arc<dyn FlowControlSender>,
        interface: &str,
    ) {
        let responder = self.clone();
        let interface = interface.to_string();
        engine.register_handler(
            &interface,
            JEEP_RADIO_REQUEST_ID,
            "dtc_responder",
            Arc::new(move |iface, _id, payload, when| {
                responder.respond(&engine, sender.as_ref(), iface, payload, when);
            }),
        );
    }

    /// Handle one inbound request payload and, if it calls for a reply,
    /// send it back through `engine` at `0x516`.
    pub fn respond(
        &self,
        engine: &IsoTpEngine,
        sender: &dyn FlowControlSender,
        interface: &str,
        payload: &[u8],
        when: f64,
    ) {
        let Some(&first) = payload.first() else { return };
        if first & 0x40 != 0 {
            return; // only requests are processed
        }
        let service = first & 0x3F;
        let reply = match service {
            SERVICE_HEARTBEAT => Some(vec![0x01, 0x7E, 0x43, 0x00, 0x00, 0x00, 0x00, 0x00]),
            SERVICE_MODULE_ID => self.module_identification(payload),
            SERVICE_DTCS_BY_STATUS => Some(canned_no_error_dtcs()),
            SERVICE_READ_DATA_BY_LOCAL_ID => self.read_data_by_local_id(payload),
            _ => None,
        };
        if let Some(bytes) = reply {
            let _ = engine.send(sender, interface, JEEP_RADIO_REPLY_ID, JEEP_RADIO_REQUEST_ID, &bytes, when);
        }
    }

    fn module_identification(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let pid = *payload.get(1)?;
        if pid == 0x87 {
            let mut reply = vec![SERVICE_MODULE_ID | 0x40, 0x87];
            reply.extend_from_slice(&[
                0x02, 0x84, 0x02, 0x05, 0xFF, 0x00, 0x03, 0x08, 0x03, 0x11, 0x35, 0x36, 0x30, 0x34,
                0x36, 0x30, 0x30, 0x36, 0x41, 0x4C,
            ]);
            Some(reply)
        } else {
            None
        }
    }

    fn read_data_by_local_id(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let pid = *payload.get(1)?;
        let snapshot = *self.snapshot.read();
        let body: Vec<u8> = match pid {
            0x09 => vec![0x01],
            0x0E => vec![snapshot.signal_strength],
            0x10 => vec![snapshot.mode_word],
            0x11 => vec![snapshot.equalizer_word],
            0x12 => snapshot.frequency_hz.to_be_bytes().to_vec(),
            0x16 => vec![0x00],
            0x18 => vec![0x00],
            0x25 => b"SIRIUS01".to_vec(),
            0x30 | 0x44 => return None, // unimplemented, no reply
            0x34 => vec![0x00],
            0x35 => vec![0x00, 0x00],
            0x36 => vec![0x00],
            0x49 => vec![0x00],
            0x50 => vec![0x00],
            0x52 => vec![0x00],
            0xE1 => b"0000000000".to_vec(),
            0xEA => vec![0x00],
            _ => return None,
        };
        let mut reply = vec![SERVICE_READ_DATA_BY_LOCAL_ID | 0x40, pid];
        reply.extend_from_slice(&body);
        Some(reply)
    }
}

fn canned_no_error_dtcs() -> Vec<u8> {
    let mut reply = vec![SERVICE_DTCS_BY_STATUS | 0x40];
    reply.extend(std::iter::repeat_n(0x00u8, 9));
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn identification_query_returns_fixed_part_number() {
        let engine = IsoTpEngine::new();
        let responder = DtcResponder::new();
        let sender = RecordingSender { sent: StdMutex::new(Vec::new()) };

        responder.respond(&engine, &sender, "can0", &[0x1A, 0x87], 0.0);

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, JEEP_RADIO_REPLY_ID);
        // Single frame: PCI 0x02 (len 2) would be wrong; this payload is 22
        // bytes so it segments into FF + CFs. Just check the FF header.
        assert_eq!(sent[0].1[0] & 0xF0, 0x10);
    }

    #[test]
    fn heartbeat_returns_fixed_payload() {
        let engine = IsoTpEngine::new();
        let responder = DtcResponder::new();
        let sender = RecordingSender { sent: StdMutex::new(Vec::new()) };

        responder.respond(&engine, &sender, "can0", &[0x3E], 0.0);

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, vec![0x02, 0x7E, 0x43, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn reply_frames_are_ignored() {
        let engine = IsoTpEngine::new();
        let responder = DtcResponder::new();
        let sender = RecordingSender { sent: StdMutex::new(Vec::new()) };
        responder.respond(&engine, &sender, "can0", &[0x3E | 0x40], 0.0);
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
