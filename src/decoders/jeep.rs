// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Jeep Wrangler (JK) body-CAN decoder.
//!
//! Stateful only for the VIN reassembly: a three-stage accumulator keyed
//! by the frame's first byte, reset whenever a new stage-0 frame arrives
//! while idle.

use parking_lot::Mutex;

use crate::frame_db::{CanFrame, FlowControlSender, FrameDb, ProtocolDecoder, Schema, Units};

const STEERING_ANGLE: u32 = 0x1E1;
const KEY_POSITION: u32 = 0x20B;
const VEHICLE_DISTANCE: u32 = 0x214;
const FUEL_LEVEL: u32 = 0x21B;
const DOORS: u32 = 0x244;
const RPM: u32 = 0x2CE;
const CLOCK: u32 = 0x3E6;
const VIN: u32 = 0x219;

struct VinAccum {
    stage: u8,
    bytes: Vec<u8>,
}

/// Decodes the Jeep Wrangler body-CAN ids this implementation gives
/// semantics to.
pub struct JeepDecoder {
    vin: Mutex<Option<VinAccum>>,
}

impl Default for JeepDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JeepDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self { vin: Mutex::new(None) }
    }

    fn process_vin_frame(&self, db: &FrameDb, data: &[u8], when: f64) {
        if data.is_empty() {
            return;
        }
        let stage = data[0];
        let chunk = &data[1..data.len().min(8)];
        let mut vin = self.vin.lock();

        match stage {
            0 => {
                *vin = Some(VinAccum { stage: 0, bytes: chunk.to_vec() });
            }
            1 => {
                if let Some(accum) = vin.as_mut() {
                    if accum.stage == 0 {
                        accum.stage = 1;
                        accum.bytes.extend_from_slice(chunk);
                    }
                }
            }
            2 => {
                if let Some(accum) = vin.as_mut() {
                    if accum.stage == 1 {
                        accum.bytes.extend_from_slice(chunk);
                        let text: String = accum.bytes.iter().map(|&b| b as char).collect();
                        db.update_value("JK_VIN", text, when);
                        *vin = None;
                    }
                }
            }
            _ => {}
        }
    }
}

impl ProtocolDecoder for JeepDecoder {
    fn register_schema(&self, db: &FrameDb) {
        db.add_schema("JK_STEERING_ANGLE", Schema::new("Steering angle", "Steering wheel angle", Units::Degrees));
        db.add_schema("JK_KEY_POSITION", Schema::new("Key position", "Ignition key position", Units::String));
        db.add_schema("JK_VEHICLE_DISTANCE", Schema::new("Vehicle distance", "Odometer distance", Units::Km));
        db.add_schema("JK_FUEL_LEVEL", Schema::new("Fuel level", "Fuel tank level", Units::Percent));
        db.add_schema("JK_DOORS", Schema::new("Doors", "Door-open bitfield", Units::BinaryBits));
        db.add_schema("JK_DOORS_LOCK", Schema::new("Doors locked", "Door lock state", Units::Bool));
        db.add_schema("JK_RPM", Schema::new("Engine RPM", "Engine RPM", Units::Rpm));
        db.add_schema("JK_CLOCK", Schema::new("Clock", "Dashboard clock", Units::String));
        db.add_schema("JK_VIN", Schema::new("VIN", "Vehicle identification number", Units::String));
    }

    fn reset(&self) {
        *self.vin.lock() = None;
    }

    fn process_frame(
        &self,
        db: &FrameDb,
        _interface: &str,
        frame: &CanFrame,
        when: f64,
        _send: &dyn FlowControlSender,
    ) {
        let d = &frame.data;
        match frame.can_id {
            STEERING_ANGLE if d.len() >= 4 => {
                let raw = (u16::from(d[2]) << 8) | u16::from(d[3]);
                if raw != 0xFFFF {
                    let angle = (f64::from(raw) - 4096.0) * 0.4;
                    db.update_value("JK_STEERING_ANGLE", format!("{:.0}", angle.round()), when);
                }
            }
            KEY_POSITION if !d.is_empty() => {
                let text = match d[0] {
                    0x00 => Some("No Key"),
                    0x01 => Some("OFF"),
                    0x61 => Some("ACC"),
                    0x81 => Some("RUN"),
                    0xA1 => Some("START"),
                    _ => None,
                };
                if let Some(text) = text {
                    db.update_value("JK_KEY_POSITION", text, when);
                }
            }
            VEHICLE_DISTANCE if d.len() >= 3 => {
                let raw = (u32::from(d[0]) << 16) | (u32::from(d[1]) << 8) | u32::from(d[2]);
                if raw != 0x00FF_FFFF {
                    db.update_value("JK_VEHICLE_DISTANCE", raw.to_string(), when);
                }
            }
            FUEL_LEVEL if d.len() >= 6 => {
                let level = f64::from(d[5]) * 100.0 / 160.0;
                db.update_value("JK_FUEL_LEVEL", format!("{level:.3}"), when);
            }
            DOORS if d.len() >= 5 => {
                db.update_value("JK_DOORS", format!("{:#010b}", d[0]), when);
                if d[4] & 0x80 != 0 {
                    db.update_value("JK_DOORS_LOCK", "false", when);
                } else if d[4] & 0x08 != 0 {
                    db.update_value("JK_DOORS_LOCK", "true", when);
                }
            }
            RPM if d.len() >= 2 => {
                let raw = (u16::from(d[0]) << 8) | u16::from(d[1]);
                if raw != 0xFFFF {
                    db.update_value("JK_RPM", (u32::from(raw) * 4).to_string(), when);
                }
            }
            CLOCK if d.len() >= 3 => {
                db.update_value("JK_CLOCK", format!("{}:{:02}:{:02}", d[0], d[1], d[2]), when);
            }
            VIN => self.process_vin_frame(db, d, when),
            _ => {}
        }
    }

    fn describe_frame(&self, frame: &CanFrame) -> Option<String> {
        match frame.can_id {
            STEERING_ANGLE => Some("Steering angle".to_string()),
            KEY_POSITION => Some("Key position".to_string()),
            VEHICLE_DISTANCE => Some("Vehicle distance".to_string()),
            FUEL_LEVEL => Some("Fuel level".to_string()),
            DOORS => Some("Doors".to_string()),
            RPM => Some("Engine RPM".to_string()),
            CLOCK => Some("Clock".to_string()),
            VIN => Some("VIN reassembly".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_db::NullSender;
    use std::sync::Arc;

    #[test]
    fn key_position_matches_known_values() {
        let db = FrameDb::new();
        db.register_protocol("can0", Arc::new(JeepDecoder::new()));
        let sender = NullSender;
        let frame = CanFrame::new(KEY_POSITION, vec![0x81, 0, 0, 0, 0, 0, 0, 0]);
        db.save_frame("can0", frame, 1.0, &sender).unwrap();
        assert_eq!(db.value("JK_KEY_POSITION").unwrap().value, "RUN");
    }

    #[test]
    fn vin_reassembles_across_three_stages() {
        let db = FrameDb::new();
        db.register_protocol("can0", Arc::new(JeepDecoder::new()));
        let sender = NullSender;
        let stage0 = CanFrame::new(VIN, vec![0, b'1', b'C', b'4', b'H', b'J', b'W', b'D']);
        let stage1 = CanFrame::new(VIN, vec![1, b'G', b'8', b'J', b'W', b'1', b'2', b'3']);
        let stage2 = CanFrame::new(VIN, vec![2, b'4', b'5', b'6', b'7', 0, 0, 0]);
        db.save_frame("can0", stage0, 1.0, &sender).unwrap();
        db.save_frame("can0", stage1, 1.1, &sender).unwrap();
        db.save_frame("can0", stage2, 1.2, &sender).unwrap();
        let vin = db.value("JK_VIN").unwrap().value;
        assert!(vin.starts_with("1C4HJWDG8JW1234567"));
    }

    #[test]
    fn steering_angle_treats_ffff_as_no_reading() {
        let db = FrameDb::new();
        db.register_protocol("can0", Arc::new(JeepDecoder::new()));
        let sender = NullSender;
        let frame = CanFrame::new(STEERING_ANGLE, vec![0, 0, 0xFF, 0xFF]);
        db.save_frame("can0", frame, 1.0, &sender).unwrap();
        assert!(db.value("JK_STEERING_ANGLE").is_none());
    }
}
