// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GM LAN decoder.
//!
//! Recognises the GM-LAN ids this implementation gives semantics to;
//! other known ids are acknowledged by [`GmLanDecoder::describe_frame`]
//! but otherwise ignored, matching the breadth of the source decoder.

use crate::frame_db::{CanFrame, FlowControlSender, FrameDb, ProtocolDecoder, Schema, Units};

const ENGINE_STATUS_1: u32 = 0x0C9;
const ENGINE_STATUS_2: u32 = 0x149;
const ENGINE_STATUS_3: u32 = 0x1A1;
const ENGINE_TORQUE_STATUS: u32 = 0x1C3;
const TRANSMISSION_STATUS_2: u32 = 0x1F5;
const INDICATOR_STATUS: u32 = 0x3E9;

/// Symbolic gear names indexed by the raw nibble at `d[0] & 0x0F`.
const GEAR_CODE: [&str; 16] = [
    "NotSupported",
    "1",
    "2",
    "3",
    "4",
    "5",
    "6",
    "7",
    "8",
    "??",
    "??",
    "xx",
    "CVTForward",
    "N",
    "R",
    "P",
];

/// Decodes the GM LAN ids this implementation publishes values for.
#[derive(Default)]
pub struct GmLanDecoder;

impl GmLanDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolDecoder for GmLanDecoder {
    fn register_schema(&self, db: &FrameDb) {
        db.add_schema("GM_ENGINE_RUNNING", Schema::new("Engine running", "Engine running flag", Units::Bool));
        db.add_schema("GM_ENGINE_RPM", Schema::new("Engine RPM", "Raw engine RPM", Units::Rpm));
        db.add_schema("GM_THROTTLE_POSITION", Schema::new("Throttle position", "Throttle position", Units::Percent));
        db.add_schema("GM_FUEL_CONSUMPTION", Schema::new("Fuel consumption", "Instantaneous fuel consumption", Units::Lph));
        db.add_schema("GM_OIL_LIFE_RESET", Schema::new("Oil life reset", "Oil life reset flag", Units::Bool));
        db.add_schema("GM_FAN_SPEED", Schema::new("Fan speed", "Cooling fan speed", Units::Percent));
        db.add_schema("GM_OIL_LIFE", Schema::new("Oil life", "Remaining oil life", Units::Percent));
        db.add_schema("GM_ENGINE_TORQUE_VALID", Schema::new("Engine torque valid", "Torque reading validity", Units::Bool));
        db.add_schema("GM_ENGINE_TORQUE", Schema::new("Engine torque", "Engine torque", Units::NewtonMeters));
        db.add_schema("GM_TRANS_GEAR", Schema::new("Transmission gear", "Current gear", Units::String));
        db.add_schema("GM_CHECK_ENGINE", Schema::new("Check engine", "Check engine indicator", Units::Bool));
        db.add_schema("GM_CHANGE_OIL", Schema::new("Change oil", "Change oil indicator", Units::Bool));
        db.add_schema("GM_REDUCED_POWER", Schema::new("Reduced power", "Reduced power indicator", Units::Bool));
        db.add_schema("GM_CHECK_FUEL_CAP", Schema::new("Check fuel cap", "Check fuel cap indicator", Units::Bool));
        db.add_schema("GM_LOW_OIL", Schema::new("Low oil", "Low oil level indicator", Units::Bool));
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
        let d = &frame.data;
        match frame.can_id {
            ENGINE_STATUS_1 if d.len() >= 3 => {
                let running = d[0] & 0x80 != 0;
                let rpm = (u16::from(d[1]) << 8) | u16::from(d[2]);
                db.update_value("GM_ENGINE_RUNNING", running.to_string(), when);
                db.update_value("GM_ENGINE_RPM", rpm.to_string(), when);
            }
            ENGINE_STATUS_2 if d.len() >= 6 => {
                let throttle = f64::from(d[1]) * 100.0 / 255.0;
                let consumption = f64::from((u16::from(d[4] & 0x03) << 8) | u16::from(d[5])) * 0.025;
                let oil_reset = d[4] & 0x10 != 0;
                db.update_value("GM_THROTTLE_POSITION", format!("{throttle:.3}"), when);
                db.update_value("GM_FUEL_CONSUMPTION", format!("{consumption:.3}"), when);
                db.update_value("GM_OIL_LIFE_RESET", oil_reset.to_string(), when);
            }
            ENGINE_STATUS_3 if d.len() >= 7 => {
                let fan = f64::from(d[5]) * 100.0 / 255.0;
                let oil_life = f64::from(d[6]) * 100.0 / 255.0;
                db.update_value("GM_FAN_SPEED", format!("{fan:.3}"), when);
                db.update_value("GM_OIL_LIFE", format!("{oil_life:.3}"), when);
            }
            ENGINE_TORQUE_STATUS if !d.is_empty() => {
                let valid = d[0] & 0x10 != 0;
                db.update_value("GM_ENGINE_TORQUE_VALID", valid.to_string(), when);
                if valid {
                    // The source reads byte 0 for both nibbles of N, a quirk
                    // mirrored here verbatim rather than "corrected".
                    let n = (u16::from(d[0] & 0x0F) << 8) | u16::from(d[0]);
                    let torque = f64::from(n) * 0.50 - 848.0;
                    db.update_value("GM_ENGINE_TORQUE", format!("{torque:.3}"), when);
                }
            }
            TRANSMISSION_STATUS_2 if !d.is_empty() => {
                // Opposite polarity from the torque frame above: the
                // source's processTransmissionStatus2 treats bit 4 clear
                // as valid.
                let valid = d[0] & 0x10 == 0;
                if valid {
                    let gear = usize::from(d[0] & 0x0F);
                    db.update_value("GM_TRANS_GEAR", GEAR_CODE[gear], when);
                }
            }
            INDICATOR_STATUS if d.len() >= 7 => {
                db.update_value("GM_CHECK_ENGINE", (d[0] & 0x01 != 0).to_string(), when);
                db.update_value("GM_CHANGE_OIL", (d[0] & 0x02 != 0).to_string(), when);
                db.update_value("GM_REDUCED_POWER", (d[0] & 0x04 != 0).to_string(), when);
                db.update_value("GM_CHECK_FUEL_CAP", (d[3] & 0x01 != 0).to_string(), when);
                db.update_value("GM_LOW_OIL", (d[6] & 0x01 != 0).to_string(), when);
            }
            _ => {}
        }
    }

    fn describe_frame(&self, frame: &CanFrame) -> Option<String> {
        match frame.can_id {
            ENGINE_STATUS_1 => Some("GM LAN engine status 1".to_string()),
            ENGINE_STATUS_2 => Some("GM LAN engine status 2".to_string()),
            ENGINE_STATUS_3 => Some("GM LAN engine status 3".to_string()),
            ENGINE_TORQUE_STATUS => Some("GM LAN engine torque status".to_string()),
            TRANSMISSION_STATUS_2 => Some("GM LAN transmission status 2".to_string()),
            INDICATOR_STATUS => Some("GM LAN indicator status".to_string()),
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
    fn engine_status_1_decodes_running_and_rpm() {
        let db = FrameDb::new();
        db.register_protocol("can0", Arc::new(GmLanDecoder::new()));
        let sender = NullSender;
        let frame = CanFrame::new(ENGINE_STATUS_1, vec![0x80, 0x0B, 0xB8]);
        db.save_frame("can0", frame, 1.0, &sender).unwrap();
        assert_eq!(db.value("GM_ENGINE_RUNNING").unwrap().value, "true");
        assert_eq!(db.value("GM_ENGINE_RPM").unwrap().value, "3000");
    }

    #[test]
    fn torque_quirk_reads_byte_zero_twice() {
        let db = FrameDb::new();
        db.register_protocol("can0", Arc::new(GmLanDecoder::new()));
        let sender = NullSender;
        let frame = CanFrame::new(ENGINE_TORQUE_STATUS, vec![0x15, 0, 0, 0, 0, 0, 0, 0]);
        db.save_frame("can0", frame, 1.0, &sender).unwrap();
        let n = (u16::from(0x15u8 & 0x0F) << 8) | u16::from(0x15u8);
        let expected = f64::from(n) * 0.50 - 848.0;
        let got: f64 = db.value("GM_ENGINE_TORQUE").unwrap().value.parse().unwrap();
        assert!((got - expected).abs() < 0.001);
    }

    #[test]
    fn transmission_status_2_decodes_symbolic_gear_when_bit4_clear() {
        let db = FrameDb::new();
        db.register_protocol("can0", Arc::new(GmLanDecoder::new()));
        let sender = NullSender;
        // nibble 0xD = 13 ("N"), bit 4 clear => valid.
        let frame = CanFrame::new(TRANSMISSION_STATUS_2, vec![0x0D, 0, 0, 0, 0, 0, 0, 0]);
        db.save_frame("can0", frame, 1.0, &sender).unwrap();
        assert_eq!(db.value("GM_TRANS_GEAR").unwrap().value, "N");
    }

    #[test]
    fn transmission_status_2_ignores_reading_when_bit4_set() {
        let db = FrameDb::new();
        db.register_protocol("can0", Arc::new(GmLanDecoder::new()));
        let sender = NullSender;
        // bit 4 set => invalid, so no value is published.
        let frame = CanFrame::new(TRANSMISSION_STATUS_2, vec![0x1D, 0, 0, 0, 0, 0, 0, 0]);
        db.save_frame("can0", frame, 1.0, &sender).unwrap();
        assert!(db.value("GM_TRANS_GEAR").is_none());
    }
}
