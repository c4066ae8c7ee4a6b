// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-peer outbound ISO-TP session state.
//!
//! ```text
//!  (none)
//!     |  send(len>=8)
//!     v
//!  WaitFc  --FC(CTS)--> Sending --last CF sent--> (destroyed)
//!     |  FC(Wait): remain in WaitFc, refresh timer
//!     |  FC(Abort): destroy
//!     |  timeout: destroy
//! ```

/// Lifecycle state of an outbound multi-frame session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// FF has been sent; waiting for the peer's flow control.
    WaitFc,
    /// CTS received; flushing consecutive frames.
    Sending,
}

/// One in-flight outbound multi-frame transfer.
#[derive(Debug, Clone)]
pub struct OutboundSession {
    pub interface: String,
    pub tx_id: u32,
    pub rx_id: u32,
    pub payload: Vec<u8>,
    /// Bytes already emitted, including the six carried by the FF.
    pub bytes_sent: usize,
    /// Sequence number for the next CF, mod 16, starting at 1.
    pub next_seq: u8,
    pub separation_delay_ms: u8,
    pub last_sent_timestamp: f64,
    pub state: SessionState,
}

impl OutboundSession {
    #[must_use]
    pub fn new(interface: &str, tx_id: u32, rx_id: u32, payload: Vec<u8>, when: f64) -> Self {
        Self {
            interface: interface.to_string(),
            tx_id,
            rx_id,
            payload,
            bytes_sent: 0,
            next_seq: 1,
            separation_delay_ms: 0,
            last_sent_timestamp: when,
            state: SessionState::WaitFc,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.payload[self.bytes_sent..]
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bytes_sent >= self.payload.len()
    }

    #[must_use]
    pub fn is_expired(&self, now: f64, timeout_secs: f64) -> bool {
        now - self.last_sent_timestamp > timeout_secs
    }
}

/// Hash key identifying a session: `(interface, rx_id)`, per the documented
/// identification rule. A plain `DefaultHasher` is sufficient; sessions are
/// only ever looked up within one process.
#[must_use]
pub fn session_key(interface: &str, rx_id: u32) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    interface.hash(&mut hasher);
    rx_id.hash(&mut hasher);
    hasher.finish()
}
