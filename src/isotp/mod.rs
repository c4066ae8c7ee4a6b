// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ISO-TP (ISO 15765-2) transport segmentation and reassembly (C3).

mod engine;
mod pci;
mod session;

pub use engine::{HandlerCallback, IsoTpEngine};
pub use pci::{Frame, FlowFlag};
pub use session::{session_key, OutboundSession, SessionState};
