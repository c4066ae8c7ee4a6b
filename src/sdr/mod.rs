// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTL-SDR source, bounded sample queues, and the radio supervisor that
//! ties them to the demodulator pipeline (C7, C9, C10).

pub mod queue;
pub mod source;
pub mod supervisor;

pub use queue::SampleQueue;
pub use source::{DeviceInfo, IqSample, RtlSdr, SdrDevice};
pub use supervisor::{RadioMode, RadioMux, RadioSupervisor};
