// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IQ-to-audio demodulator pipeline (C8).
//!
//! The broadcast-FM and narrowband-FM decoders share a common IF-shaping
//! and downsampling stage (`shift_and_downsample`) and both implement
//! [`Demodulator`], letting the radio supervisor's processor thread hold
//! `Box<dyn Demodulator + Send>` without matching on mode. This generalizes
//! the source's two concrete decoder classes into one capability set.

mod fm_broadcast;
mod narrowband;

pub use fm_broadcast::BroadcastFmDecoder;
pub use narrowband::NarrowbandFmDecoder;

use crate::sdr::source::IqSample;

/// Interleaved stereo output in `[-1, +1]`, plus the observable signals a
/// decoder publishes for the radio supervisor and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DemodOutput {
    /// Interleaved `[l0, r0, l1, r1, ...]` if stereo, else mono samples.
    pub audio: Vec<f64>,
    /// IF signal level, in dB.
    pub if_level: f64,
    /// Baseband signal level, in dB.
    pub baseband_level: f64,
    /// True if a stereo pilot tone is currently detected.
    pub stereo_detected: bool,
}

/// A demodulator turning one block of IQ samples into one block of audio.
pub trait Demodulator: Send {
    fn process(&mut self, samples: &[IqSample]) -> DemodOutput;
}

/// Downsample factor so the IF bandwidth fits comfortably under Nyquist at
/// `target_hz` (215 kHz for broadcast FM).
#[must_use]
pub fn downsample_factor(sample_rate_hz: u32, target_hz: u32) -> usize {
    ((sample_rate_hz / target_hz) as usize).max(1)
}

/// Decimate `samples` by `factor`, taking every `factor`-th sample. This
/// mirrors the source's simple block decimation rather than a polyphase
/// filter; the IF filter immediately downstream removes the resulting
/// aliasing within the passband that matters for demodulation.
#[must_use]
pub fn decimate(samples: &[IqSample], factor: usize) -> Vec<IqSample> {
    if factor <= 1 {
        return samples.to_vec();
    }
    samples.iter().step_by(factor).copied().collect()
}

/// Shift `samples` down by `offset_hz` relative to `sample_rate_hz`, used
/// to move the tuned signal off DC (the tuning is deliberately offset by
/// `0.25 * sample_rate` when the SDR source is configured).
#[must_use]
pub fn shift_to_baseband(
    samples: &[IqSample],
    sample_rate_hz: f64,
    offset_hz: f64,
    phase: &mut f64,
) -> Vec<IqSample> {
    let step = -2.0 * std::f64::consts::PI * offset_hz / sample_rate_hz;
    samples
        .iter()
        .map(|&s| {
            let rotor = num_complex::Complex64::from_polar(1.0, *phase);
            *phase += step;
            if *phase > std::f64::consts::PI {
                *phase -= 2.0 * std::f64::consts::PI;
            } else if *phase < -std::f64::consts::PI {
                *phase += 2.0 * std::f64::consts::PI;
            }
            num_complex::Complex64::new(f64::from(s.re), f64::from(s.im)) * rotor
        })
        .collect()
}

/// A single-pole IIR low-pass, used both as the IF bandwidth filter and as
/// the de-emphasis filter (with a different time constant).
#[derive(Debug, Clone, Copy)]
pub struct OnePoleLowPass {
    alpha: f64,
    state: f64,
}

impl OnePoleLowPass {
    #[must_use]
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
        let dt = 1.0 / sample_rate_hz;
        Self { alpha: dt / (rc + dt), state: 0.0 }
    }

    pub fn apply(&mut self, x: f64) -> f64 {
        self.state += self.alpha * (x - self.state);
        self.state
    }
}

/// RMS level of `samples`, in dB relative to full-scale (1.0).
#[must_use]
pub fn level_db(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let mean_sq: f64 = samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64;
    10.0 * mean_sq.max(1e-12).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_factor_floors_and_has_minimum_one() {
        assert_eq!(downsample_factor(1_000_000, 215_000), 4);
        assert_eq!(downsample_factor(100_000, 215_000), 1);
    }

    #[test]
    fn decimate_takes_every_nth_sample() {
        let samples: Vec<IqSample> = (0..8).map(|i| IqSample::new(i as f32, 0.0)).collect();
        let out = decimate(&samples, 2);
        assert_eq!(out.len(), 4);
        assert_eq!(out[1].re, 2.0);
    }

    #[test]
    fn low_pass_converges_to_constant_input() {
        let mut lp = OnePoleLowPass::new(100.0, 48_000.0);
        let mut last = 0.0;
        for _ in 0..10_000 {
            last = lp.apply(1.0);
        }
        assert!((last - 1.0).abs() < 0.01);
    }
}
