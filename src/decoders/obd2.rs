// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OBD-II (SAE J1979) decoder.
//!
//! Owns its own small First-Frame/Consecutive-Frame reassembly table,
//! separate from the generic ISO-TP engine (§4.5.1): the generic engine's
//! receive path is Single-Frame-only, and OBD multi-frame replies (DTC
//! lists, VIN) are common enough to warrant a dedicated reassembly path
//! here rather than generalizing the engine.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::{is_obd_reply_id, OBD_BROADCAST_ID};
use crate::frame_db::{CanFrame, FlowControlSender, FrameDb, ProtocolDecoder, Schema, Units};

struct Reassembly {
    total_len: usize,
    buf: Vec<u8>,
    expected_seq: u8,
}

/// Decodes OBD-II service 0x01/0x02/0x03/0x07/0x09 replies.
#[derive(Default)]
pub struct Obd2Decoder {
    reassembly: Mutex<HashMap<u32, Reassembly>>,
}

impl Obd2Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_reply(&self, db: &FrameDb, payload: &[u8], when: f64) {
        let Some(&service_reply) = payload.first() else { return };
        if service_reply & 0x40 == 0 {
            return; // not a response
        }
        let service = service_reply & !0x40;
        match service {
            0x01 | 0x02 => {
                if payload.len() < 2 {
                    return;
                }
                decode_pid(db, payload[1], &payload[2..], when);
            }
            0x09 => {
                // payload: [service|0x40, pid, nodi, ascii...]
                if payload.len() < 3 {
                    return;
                }
                let pid = payload[1];
                let text: String = payload[3..].iter().map(|&b| b as char).collect();
                match pid {
                    0x02 => db.update_value("OBD_VIN", text.trim(), when),
                    0x0A => db.update_value("OBD_ECU_NAME", text.trim(), when),
                    _ => {}
                }
            }
            0x03 | 0x07 => {
                let codes: Vec<String> = payload[1..]
                    .chunks_exact(2)
                    .map(|pair| decode_dtc(pair[0], pair[1]))
                    .collect();
                db.update_value("OBD_DTC_LIST", codes.join(","), when);
            }
            _ => {}
        }
    }
}

impl ProtocolDecoder for Obd2Decoder {
    fn register_schema(&self, db: &FrameDb) {
        for &(key, units, pid) in PID_SCHEMAS {
            db.add_schema(key, Schema::new(key, key, units).with_obd_request(vec![0x01, pid]));
        }
        db.add_schema("OBD_VIN", Schema::new("VIN", "Vehicle identification number", Units::String).with_obd_request(vec![0x09, 0x02]));
        db.add_schema("OBD_ECU_NAME", Schema::new("ECU name", "Reporting ECU name", Units::String).with_obd_request(vec![0x09, 0x0A]));
        db.add_schema("OBD_DTC_LIST", Schema::new("DTCs", "Stored diagnostic trouble codes", Units::DtcList).with_obd_request(vec![0x03]));
    }

    fn reset(&self) {
        self.reassembly.lock().clear();
    }

    fn process_frame(
        &self,
        db: &FrameDb,
        interface: &str,
        frame: &CanFrame,
        when: f64,
        send: &dyn FlowControlSender,
    ) {
        if !is_obd_reply_id(frame.can_id) && frame.can_id != OBD_BROADCAST_ID {
            return;
        }
        let data = &frame.data;
        let Some(&b0) = data.first() else { return };
        match b0 >> 4 {
            0x0 => {
                let len = usize::from(b0 & 0x0F);
                if data.len() < 1 + len {
                    return;
                }
                self.decode_reply(db, &data[1..1 + len], when);
            }
            0x1 => {
                if data.len() < 8 {
                    return;
                }
                let total_len = (usize::from(b0 & 0x0F) << 8) | usize::from(data[1]);
                let fc_id = frame.can_id.saturating_sub(8);
                let fc = vec![0x30, 0x00, 0x0A, 0, 0, 0, 0, 0];
                if send.send_raw(interface, fc_id, &fc) {
                    self.reassembly.lock().insert(
                        frame.can_id,
                        Reassembly { total_len, buf: data[2..8].to_vec(), expected_seq: 1 },
                    );
                }
            }
            0x2 => {
                let seq = b0 & 0x0F;
                let mut table = self.reassembly.lock();
                let Some(entry) = table.get_mut(&frame.can_id) else { return };
                if seq != entry.expected_seq {
                    table.remove(&frame.can_id);
                    return;
                }
                entry.buf.extend_from_slice(&data[1..]);
                entry.expected_seq = (entry.expected_seq + 1) % 16;
                if entry.buf.len() >= entry.total_len {
                    entry.buf.truncate(entry.total_len);
                    let complete = entry.buf.clone();
                    table.remove(&frame.can_id);
                    drop(table);
                    self.decode_reply(db, &complete, when);
                }
            }
            _ => {}
        }
    }

    fn describe_frame(&self, frame: &CanFrame) -> Option<String> {
        if is_obd_reply_id(frame.can_id) {
            Some(format!("OBD-II reply from ECU {:#x}", frame.can_id))
        } else if frame.can_id == OBD_BROADCAST_ID {
            Some("OBD-II broadcast request".to_string())
        } else {
            None
        }
    }

    fn can_be_polled(&self) -> bool {
        true
    }
}

fn decode_dtc(b0: u8, b1: u8) -> String {
    let letter = match b0 >> 6 {
        0 => 'P',
        1 => 'C',
        2 => 'B',
        _ => 'U',
    };
    let d1 = (b0 >> 4) & 0x3;
    let d2 = b0 & 0x0F;
    format!("{letter}{d1:01X}{d2:01X}{b1:02X}")
}

const PID_SCHEMAS: &[(&str, Units, u8)] = &[
    ("OBD_ENGINE_LOAD", Units::Percent, 0x04),
    ("OBD_COOLANT_TEMP", Units::DegreesC, 0x05),
    ("OBD_FUEL_TRIM_SHORT_1", Units::FuelTrim, 0x06),
    ("OBD_FUEL_TRIM_LONG_1", Units::FuelTrim, 0x07),
    ("OBD_FUEL_TRIM_SHORT_2", Units::FuelTrim, 0x08),
    ("OBD_FUEL_TRIM_LONG_2", Units::FuelTrim, 0x09),
    ("OBD_FUEL_PRESSURE", Units::KPa, 0x0A),
    ("OBD_INTAKE_MAP", Units::KPa, 0x0B),
    ("OBD_RPM", Units::Rpm, 0x0C),
    ("OBD_VEHICLE_SPEED", Units::Kph, 0x0D),
    ("OBD_TIMING_ADVANCE", Units::Degrees, 0x0E),
    ("OBD_INTAKE_AIR_TEMP", Units::DegreesC, 0x0F),
    ("OBD_MAF_RATE", Units::GramsPerSecond, 0x10),
    ("OBD_THROTTLE_POSITION", Units::Percent, 0x11),
    ("OBD_RUN_TIME", Units::Seconds, 0x1F),
    ("OBD_FUEL_LEVEL", Units::Percent, 0x2F),
    ("OBD_BAROMETRIC_PRESSURE", Units::KPa, 0x33),
    ("OBD_CONTROL_MODULE_VOLTAGE", Units::Volts, 0x42),
    ("OBD_ABSOLUTE_LOAD", Units::Percent, 0x43),
    ("OBD_AMBIENT_AIR_TEMP", Units::DegreesC, 0x46),
    ("OBD_ENGINE_OIL_TEMP", Units::DegreesC, 0x5C),
];

fn decode_pid(db: &FrameDb, pid: u8, data: &[u8], when: f64) {
    let a = f64::from(*data.first().unwrap_or(&0));
    let b = f64::from(*data.get(1).unwrap_or(&0));
    let ab = |a: f64, b: f64| a * 256.0 + b;

    let (key, value) = match pid {
        0x04 => ("OBD_ENGINE_LOAD", a / 2.55),
        0x05 => ("OBD_COOLANT_TEMP", a - 40.0),
        0x06 => ("OBD_FUEL_TRIM_SHORT_1", a / 1.28 - 100.0),
        0x07 => ("OBD_FUEL_TRIM_LONG_1", a / 1.28 - 100.0),
        0x08 => ("OBD_FUEL_TRIM_SHORT_2", a / 1.28 - 100.0),
        0x09 => ("OBD_FUEL_TRIM_LONG_2", a / 1.28 - 100.0),
        0x0A => ("OBD_FUEL_PRESSURE", a * 3.0),
        0x0B => ("OBD_INTAKE_MAP", a),
        0x0C => ("OBD_RPM", ab(a, b) / 4.0),
        0x0D => ("OBD_VEHICLE_SPEED", a),
        0x0E => ("OBD_TIMING_ADVANCE", a / 2.0 - 64.0),
        0x0F => ("OBD_INTAKE_AIR_TEMP", a - 40.0),
        0x10 => ("OBD_MAF_RATE", ab(a, b) / 100.0),
        0x11 => ("OBD_THROTTLE_POSITION", a / 2.55),
        0x1F => ("OBD_RUN_TIME", ab(a, b)),
        0x2F => ("OBD_FUEL_LEVEL", a / 2.55),
        0x33 => ("OBD_BAROMETRIC_PRESSURE", a),
        0x42 => ("OBD_CONTROL_MODULE_VOLTAGE", ab(a, b) / 1000.0),
        0x43 => ("OBD_ABSOLUTE_LOAD", ab(a, b) / 2.55),
        0x46 => ("OBD_AMBIENT_AIR_TEMP", a - 40.0),
        0x5C => ("OBD_ENGINE_OIL_TEMP", a - 40.0),
        _ => {
            log::debug!("obd2: unrecognized PID {pid:#x}, skipping");
            return;
        }
    };
    // RPM is conventionally reported as a whole number (no fractional
    // RPM), so it's published as a bare integer rather than the generic
    // 3-decimal formatting used for every other PID.
    if key == "OBD_RPM" {
        db.update_value(key, format!("{}", value.trunc() as i64), when);
    } else {
        db.update_value(key, format!("{value:.3}"), when);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_db::NullSender;
    use std::sync::Arc;

    #[test]
    fn single_frame_rpm_reply_decodes() {
        let db = FrameDb::new();
        let decoder = Arc::new(Obd2Decoder::new());
        db.register_protocol("can0", decoder);
        let sender = NullSender;
        // SF len=4: {0x41, 0x0C, 0x1A, 0xF8}
        let frame = CanFrame::new(0x7E8, vec![0x04, 0x41, 0x0C, 0x1A, 0xF8, 0, 0, 0]);
        db.save_frame("can0", frame, 1.0, &sender).unwrap();
        let rpm: f64 = db.value("OBD_RPM").unwrap().value.parse().unwrap();
        assert!((rpm - f64::from(0x1AF8_u16) / 4.0).abs() < 0.001);
    }

    #[test]
    fn multi_frame_vin_reassembles_full_17_chars() {
        let db = FrameDb::new();
        let decoder = Arc::new(Obd2Decoder::new());
        db.register_protocol("can0", decoder);
        let sender = NullSender;

        // FF: service 0x49 (0x09|0x40), pid 0x02, NODI 0x01, then "1FA".
        let ff = CanFrame::new(0x7E8, vec![0x10, 0x14, 0x49, 0x02, 0x01, 0x31, 0x46, 0x41]);
        db.save_frame("can0", ff, 1.0, &sender).unwrap();
        let cf1 = CanFrame::new(0x7E8, vec![0x21, 0x48, 0x50, 0x30, 0x4C, 0x45, 0x46, 0x37]);
        db.save_frame("can0", cf1, 1.1, &sender).unwrap();
        let cf2 = CanFrame::new(0x7E8, vec![0x22, 0x37, 0x52, 0x30, 0x42, 0x36, 0x30, 0x30]);
        db.save_frame("can0", cf2, 1.2, &sender).unwrap();

        let vin = db.value("OBD_VIN").unwrap().value;
        assert_eq!(vin.len(), 17);
        assert!(vin.starts_with("1FAHP0LEF7"));
    }

    #[test]
    fn multi_frame_dtc_list_reassembles() {
        let db = FrameDb::new();
        let decoder = Arc::new(Obd2Decoder::new());
        db.register_protocol("can0", decoder);
        let sender = NullSender;

        // total len 3: {0x47 (service 0x07 | 0x40), P0301 = 0x03,0x01}
        let ff = CanFrame::new(0x7E8, vec![0x10, 0x03, 0x47, 0x03, 0x01, 0, 0, 0]);
        db.save_frame("can0", ff, 1.0, &sender).unwrap();
        let cf = CanFrame::new(0x7E8, vec![0x21, 0, 0, 0, 0, 0, 0, 0]);
        db.save_frame("can0", cf, 1.1, &sender).unwrap();

        assert_eq!(db.value("OBD_DTC_LIST").unwrap().value, "P0301");
    }

    #[test]
    fn decode_dtc_picks_letter_by_system() {
        assert_eq!(decode_dtc(0x03, 0x01), "P0301");
        assert_eq!(&decode_dtc(0x43, 0x00)[..1], "C");
        assert_eq!(&decode_dtc(0x83, 0x00)[..1], "B");
        assert_eq!(&decode_dtc(0xC3, 0x00)[..1], "U");
    }
}
