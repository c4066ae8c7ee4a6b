// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broadcast FM (stereo) demodulator.

use num_complex::Complex64;

use crate::demod::{decimate, downsample_factor, level_db, shift_to_baseband, DemodOutput, Demodulator, OnePoleLowPass};
use crate::sdr::source::IqSample;

const IF_TARGET_HZ: u32 = 215_000;
const STEREO_PILOT_HZ: f64 = 19_000.0;
const DEEMPHASIS_US: f64 = 75.0;

/// Broadcast FM decoder: stereo pilot detection, de-emphasis, resample to
/// the output PCM rate.
pub struct BroadcastFmDecoder {
    sample_rate_hz: u32,
    pcm_rate_hz: u32,
    shift_phase: f64,
    if_filter: OnePoleLowPass,
    pilot_filter: OnePoleLowPass,
    deemph_left: OnePoleLowPass,
    deemph_right: OnePoleLowPass,
    prev_sample: Complex64,
    pilot_phase: f64,
    stereo_detected: bool,
}

impl BroadcastFmDecoder {
    #[must_use]
    pub fn new(sample_rate_hz: u32, pcm_rate_hz: u32) -> Self {
        let if_rate = (sample_rate_hz as f64) / downsample_factor(sample_rate_hz, IF_TARGET_HZ) as f64;
        let deemph_cutoff = 1.0 / (2.0 * std::f64::consts::PI * DEEMPHASIS_US * 1e-6);
        Self {
            sample_rate_hz,
            pcm_rate_hz,
            shift_phase: 0.0,
            if_filter: OnePoleLowPass::new(IF_TARGET_HZ as f64, sample_rate_hz as f64),
            pilot_filter: OnePoleLowPass::new(200.0, if_rate),
            deemph_left: OnePoleLowPass::new(deemph_cutoff, if_rate),
            deemph_right: OnePoleLowPass::new(deemph_cutoff, if_rate),
            prev_sample: Complex64::new(1.0, 0.0),
            pilot_phase: 0.0,
            stereo_detected: false,
        }
    }
}

impl Demodulator for BroadcastFmDecoder {
    fn process(&mut self, samples: &[IqSample]) -> DemodOutput {
        if samples.is_empty() {
            return DemodOutput { stereo_detected: self.stereo_detected, ..DemodOutput::default() };
        }

        let offset_hz = 0.25 * f64::from(self.sample_rate_hz);
        let baseband = shift_to_baseband(samples, f64::from(self.sample_rate_hz), offset_hz, &mut self.shift_phase);

        let if_level = level_db(&baseband.iter().map(|s| s.re).collect::<Vec<_>>());

        let filtered: Vec<Complex64> = baseband
            .iter()
            .map(|s| Complex64::new(self.if_filter.apply(s.re), self.if_filter.apply(s.im)))
            .collect();

        let factor = downsample_factor(self.sample_rate_hz, IF_TARGET_HZ);
        let decimated: Vec<IqSample> =
            decimate(&filtered.iter().map(|c| IqSample::new(c.re as f32, c.im as f32)).collect::<Vec<_>>(), factor);
        let if_rate = f64::from(self.sample_rate_hz) / factor as f64;

        let pilot_step = 2.0 * std::f64::consts::PI * STEREO_PILOT_HZ / if_rate;
        let mut baseband_audio = Vec::with_capacity(decimated.len());
        let mut pilot_energy = 0.0;
        for &s in &decimated {
            let s64 = Complex64::new(f64::from(s.re), f64::from(s.im));
            let diff = s64 * self.prev_sample.conj();
            self.prev_sample = s64;
            let phase_diff = diff.im.atan2(diff.re);
            baseband_audio.push(phase_diff);

            // Coherent detection: mix the FM-demodulated signal down by the
            // pilot frequency and low-pass the result; a steady 19 kHz
            // component survives as near-DC energy.
            let mixed = phase_diff * (self.pilot_phase).cos();
            self.pilot_phase += pilot_step;
            if self.pilot_phase > std::f64::consts::PI {
                self.pilot_phase -= 2.0 * std::f64::consts::PI;
            }
            pilot_energy += self.pilot_filter.apply(mixed).powi(2);
        }

        self.stereo_detected = (pilot_energy / decimated.len().max(1) as f64).sqrt() > 0.02;
        let baseband_level = level_db(&baseband_audio);

        let resample_factor = (if_rate / f64::from(self.pcm_rate_hz)).max(1.0) as usize;
        let audio: Vec<f64> = baseband_audio
            .chunks(resample_factor.max(1))
            .map(|chunk| chunk.iter().copied().sum::<f64>() / chunk.len() as f64)
            .collect();

        let mut interleaved = Vec::with_capacity(audio.len() * 2);
        for &mono in &audio {
            let left = self.deemph_left.apply(mono) * 0.5;
            let right = if self.stereo_detected {
                self.deemph_right.apply(mono) * 0.5
            } else {
                left
            };
            interleaved.push(left);
            interleaved.push(right);
        }

        DemodOutput { audio: interleaved, if_level, baseband_level, stereo_detected: self.stereo_detected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_input_produces_no_pilot_detection() {
        let mut decoder = BroadcastFmDecoder::new(1_000_000, 48_000);
        let samples = vec![IqSample::new(0.0, 0.0); 4096];
        let out = decoder.process(&samples);
        assert!(!out.stereo_detected);
    }

    #[test]
    fn empty_block_returns_empty_audio() {
        let mut decoder = BroadcastFmDecoder::new(1_000_000, 48_000);
        let out = decoder.process(&[]);
        assert!(out.audio.is_empty());
    }

    #[test]
    fn output_amplitude_stays_bounded() {
        let mut decoder = BroadcastFmDecoder::new(1_000_000, 48_000);
        let samples: Vec<IqSample> =
            (0..4096).map(|i| IqSample::new((i as f32 * 0.01).sin(), (i as f32 * 0.01).cos())).collect();
        let out = decoder.process(&samples);
        for sample in out.audio {
            assert!(sample.abs() <= 1.0);
        }
    }
}
