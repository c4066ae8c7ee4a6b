// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration - protocol-fixed constants plus runtime tunables.
//!
//! # Architecture
//!
//! - **Level 1 (static)**: protocol-fixed CAN identifiers and PCI nibbles,
//!   which never change at runtime.
//! - **Level 2 (dynamic)**: [`Config`], a small `Clone`-able struct of
//!   tunables (poll periods, timeouts, SDR defaults) passed by value into
//!   the subsystems that need it.

use std::time::Duration;

// =======================================================================
// OBD-II CAN identifiers (SAE J1979)
// =======================================================================

/// OBD-II broadcast request id. All diagnostic scan tools transmit here;
/// every ECU on the bus may reply.
pub const OBD_BROADCAST_ID: u32 = 0x7DF;
/// First per-ECU physically-addressed request id (`0x7E0..=0x7E7`).
pub const OBD_REQUEST_ID_BASE: u32 = 0x7E0;
/// First per-ECU reply id (`0x7E8..=0x7EF`). Requests and replies share the
/// same offset from their respective base.
pub const OBD_REPLY_ID_BASE: u32 = 0x7E8;

/// True if `id` is one of the eight OBD-II per-ECU request ids.
#[must_use]
pub const fn is_obd_request_id(id: u32) -> bool {
    id >= OBD_REQUEST_ID_BASE && id < OBD_REQUEST_ID_BASE + 8
}

/// True if `id` is one of the eight OBD-II per-ECU reply ids.
#[must_use]
pub const fn is_obd_reply_id(id: u32) -> bool {
    id >= OBD_REPLY_ID_BASE && id < OBD_REPLY_ID_BASE + 8
}

// =======================================================================
// Jeep factory radio module
// =======================================================================

/// Request id the instrument cluster uses to query the factory radio.
pub const JEEP_RADIO_REQUEST_ID: u32 = 0x6B0;
/// Reply id the factory radio answers on.
pub const JEEP_RADIO_REPLY_ID: u32 = 0x516;

// =======================================================================
// ISO-TP PCI nibbles (ISO 15765-2)
// =======================================================================

/// ISO-TP PCI high nibble for Single Frame.
pub const PCI_SINGLE_FRAME: u8 = 0x0;
/// ISO-TP PCI high nibble for First Frame.
pub const PCI_FIRST_FRAME: u8 = 0x1;
/// ISO-TP PCI high nibble for Consecutive Frame.
pub const PCI_CONSECUTIVE_FRAME: u8 = 0x2;
/// ISO-TP PCI high nibble for Flow Control.
pub const PCI_FLOW_CONTROL: u8 = 0x3;

/// Maximum ISO-TP payload length (12-bit length field).
pub const ISOTP_MAX_PAYLOAD: usize = 4096;
/// CAN data length code, always 8 on the wire (right-padded).
pub const CAN_DLC: usize = 8;

// =======================================================================
// Runtime configuration
// =======================================================================

/// Runtime tunables shared across subsystems.
///
/// Small and `Clone`-able by design (no interior `Arc`/lock needed); every
/// subsystem constructor takes its own copy.
#[derive(Debug, Clone)]
pub struct Config {
    /// How often the OBD polling tick may fire, at minimum.
    pub obd_poll_period: Duration,
    /// How long an outbound ISO-TP session may sit in `WAIT_FC`/`SENDING`
    /// without activity before it is dropped.
    pub isotp_session_timeout: Duration,
    /// `mio::Poll` timeout for the CAN reader thread's event loop.
    pub can_poll_timeout: Duration,
    /// Default RTL-SDR sample rate, in Hz.
    pub sdr_sample_rate_hz: u32,
    /// Default RTL-SDR block length, in IQ sample pairs.
    pub sdr_block_length: usize,
    /// Output PCM sample rate, in Hz.
    pub pcm_rate_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            obd_poll_period: Duration::from_millis(500),
            isotp_session_timeout: Duration::from_secs(1),
            can_poll_timeout: Duration::from_millis(200),
            sdr_sample_rate_hz: 1_000_000,
            sdr_block_length: 65_536,
            pcm_rate_hz: 48_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obd_id_ranges() {
        assert!(is_obd_request_id(0x7E0));
        assert!(is_obd_request_id(0x7E7));
        assert!(!is_obd_request_id(0x7E8));
        assert!(is_obd_reply_id(0x7E8));
        assert!(is_obd_reply_id(0x7EF));
        assert!(!is_obd_reply_id(0x7F0));
    }

    #[test]
    fn default_config_matches_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.obd_poll_period, Duration::from_millis(500));
        assert_eq!(cfg.isotp_session_timeout, Duration::from_secs(1));
        assert_eq!(cfg.sdr_sample_rate_hz, 1_000_000);
        assert_eq!(cfg.sdr_block_length, 65_536);
    }
}
