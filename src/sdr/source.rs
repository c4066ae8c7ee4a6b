// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTL-SDR device wrapper (C7).
//!
//! Thin layer over [`rtl_sdr_rs`]: opens a device by index, exposes the
//! setters the radio supervisor needs, and converts raw 8-bit unsigned
//! interleaved I/Q bytes into [`num_complex::Complex32`] samples in
//! `[-1, +1)`.

use num_complex::Complex32;
use rtl_sdr_rs::{RtlSdr as Device, TunerGain};

use crate::{Error, Result};

/// Default RTL-SDR block length, in IQ sample pairs.
pub const DEFAULT_BLOCK_LENGTH: usize = 65_536;
/// Default RTL-SDR sample rate, in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 1_000_000;

/// One IQ sample, `[-1, +1)` in each component.
pub type IqSample = Complex32;

/// Vendor/product/serial identification for one RTL-SDR device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

/// The subset of RTL-SDR device control the radio supervisor needs.
/// Lets the supervisor be exercised against a fake device in tests.
pub trait SdrDevice: Send {
    fn set_frequency(&mut self, freq_hz: u32) -> Result<()>;
    fn reset_buffer(&mut self) -> Result<()>;
    fn read_block(&mut self) -> Result<Vec<IqSample>>;
    fn block_length(&self) -> usize;
}

/// An open RTL-SDR device, reading 8-bit unsigned I/Q samples.
pub struct RtlSdr {
    device: Device,
    block_length: usize,
    raw_buf: Vec<u8>,
}

impl RtlSdr {
    /// Open device `index` and configure it with the given defaults.
    pub fn open(index: u32, block_length: usize) -> Result<Self> {
        let device = Device::open(index)
            .map_err(|e| Error::DeviceOpenFailed(format!("RTL-SDR index {index}: {e}")))?;
        let mut sdr = Self { device, block_length, raw_buf: vec![0u8; block_length * 2] };
        sdr.set_sample_rate(DEFAULT_SAMPLE_RATE)?;
        Ok(sdr)
    }

    /// Set the tuner center frequency, in Hz.
    pub fn set_frequency(&mut self, freq_hz: u32) -> Result<()> {
        self.device
            .set_center_freq(freq_hz)
            .map_err(|e| Error::DeviceOpenFailed(format!("set_center_freq: {e}")))
    }

    /// Return the tuner's current center frequency, in Hz.
    #[must_use]
    pub fn frequency(&self) -> u32 {
        self.device.get_center_freq()
    }

    /// Set the device sample rate, in Hz.
    pub fn set_sample_rate(&mut self, rate_hz: u32) -> Result<()> {
        self.device
            .set_sample_rate(rate_hz)
            .map_err(|e| Error::DeviceOpenFailed(format!("set_sample_rate: {e}")))
    }

    /// Return the device's current sample rate, in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.device.get_sample_rate()
    }

    /// Set tuner gain in tenths of a dB, or `None` for automatic gain.
    pub fn set_tuner_gain(&mut self, tenths_db: Option<i32>) -> Result<()> {
        let gain = match tenths_db {
            None => TunerGain::Auto,
            Some(value) => {
                let gains = self.tuner_gains()?;
                if !gains.contains(&value) {
                    return Err(Error::DeviceOpenFailed(format!(
                        "requested gain {value} not in device's supported steps"
                    )));
                }
                TunerGain::Manual(value)
            }
        };
        self.device
            .set_tuner_gain(gain)
            .map_err(|e| Error::DeviceOpenFailed(format!("set_tuner_gain: {e}")))
    }

    /// Enumerate the device's supported discrete gain steps, in tenths of
    /// a dB.
    pub fn tuner_gains(&mut self) -> Result<Vec<i32>> {
        self.device
            .get_tuner_gains()
            .map_err(|e| Error::DeviceOpenFailed(format!("get_tuner_gains: {e}")))
    }

    /// Enable or disable the tuner's hardware AGC.
    pub fn set_agc_mode(&mut self, enabled: bool) -> Result<()> {
        self.device
            .set_agc_mode(enabled)
            .map_err(|e| Error::DeviceOpenFailed(format!("set_agc_mode: {e}")))
    }

    /// Reset the device-side ring buffer, discarding any buffered samples.
    pub fn reset_buffer(&mut self) -> Result<()> {
        self.device
            .reset_buffer()
            .map_err(|e| Error::DeviceOpenFailed(format!("reset_buffer: {e}")))
    }

    /// Read one block of `block_length` IQ samples synchronously.
    ///
    /// A short read is reported as [`Error::DeviceOpenFailed`] and is not
    /// retried; the caller decides whether to reopen the device.
    pub fn read_block(&mut self) -> Result<Vec<IqSample>> {
        let want = self.raw_buf.len();
        self.device
            .read_sync(&mut self.raw_buf)
            .map_err(|e| Error::DeviceOpenFailed(format!("read_sync: {e}")))
            .and_then(|n| {
                if n != want {
                    Err(Error::DeviceOpenFailed(format!("short read: got {n} of {want} bytes")))
                } else {
                    Ok(())
                }
            })?;
        Ok(self.raw_buf.chunks_exact(2).map(|pair| bytes_to_iq(pair[0], pair[1])).collect())
    }

    /// Block length, in IQ sample pairs.
    #[must_use]
    pub fn block_length(&self) -> usize {
        self.block_length
    }

    /// List the connected RTL-SDR devices.
    pub fn devices() -> Vec<DeviceInfo> {
        rtl_sdr_rs::enumerate_devices()
            .into_iter()
            .enumerate()
            .map(|(i, d)| DeviceInfo {
                index: i as u32,
                vendor: d.vendor,
                product: d.product,
                serial: d.serial,
            })
            .collect()
    }
}

impl SdrDevice for RtlSdr {
    fn set_frequency(&mut self, freq_hz: u32) -> Result<()> {
        RtlSdr::set_frequency(self, freq_hz)
    }

    fn reset_buffer(&mut self) -> Result<()> {
        RtlSdr::reset_buffer(self)
    }

    fn read_block(&mut self) -> Result<Vec<IqSample>> {
        RtlSdr::read_block(self)
    }

    fn block_length(&self) -> usize {
        RtlSdr::block_length(self)
    }
}

fn bytes_to_iq(i: u8, q: u8) -> IqSample {
    Complex32::new((f32::from(i) - 128.0) / 128.0, (f32::from(q) - 128.0) / 128.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_iq_maps_extremes() {
        assert_eq!(bytes_to_iq(0, 0), Complex32::new(-1.0, -1.0));
        assert_eq!(bytes_to_iq(128, 128), Complex32::new(0.0, 0.0));
        assert!((bytes_to_iq(255, 255).re - 0.9921875).abs() < 1e-6);
    }
}
