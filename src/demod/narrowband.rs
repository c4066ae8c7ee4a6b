// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Narrowband FM demodulator (VHF/GMRS): downsample, IF-filter,
//! FM-demodulate without stereo.

use num_complex::Complex64;

use crate::demod::{decimate, level_db, shift_to_baseband, DemodOutput, Demodulator, OnePoleLowPass};
use crate::sdr::source::IqSample;

const IF_TARGET_HZ: u32 = 12_500;

/// Narrowband FM decoder for VHF marine/GMRS-style channels. No stereo.
pub struct NarrowbandFmDecoder {
    sample_rate_hz: u32,
    pcm_rate_hz: u32,
    shift_phase: f64,
    if_filter: OnePoleLowPass,
    prev_sample: Complex64,
}

impl NarrowbandFmDecoder {
    #[must_use]
    pub fn new(sample_rate_hz: u32, pcm_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            pcm_rate_hz,
            shift_phase: 0.0,
            if_filter: OnePoleLowPass::new(IF_TARGET_HZ as f64, sample_rate_hz as f64),
            prev_sample: Complex64::new(1.0, 0.0),
        }
    }

    fn downsample_factor(&self) -> usize {
        crate::demod::downsample_factor(self.sample_rate_hz, IF_TARGET_HZ)
    }
}

impl Demodulator for NarrowbandFmDecoder {
    fn process(&mut self, samples: &[IqSample]) -> DemodOutput {
        if samples.is_empty() {
            return DemodOutput::default();
        }

        let offset_hz = 0.25 * f64::from(self.sample_rate_hz);
        let baseband = shift_to_baseband(samples, f64::from(self.sample_rate_hz), offset_hz, &mut self.shift_phase);
        let if_level = level_db(&baseband.iter().map(|s| s.re).collect::<Vec<_>>());

        let filtered: Vec<IqSample> = baseband
            .iter()
            .map(|s| IqSample::new(self.if_filter.apply(s.re) as f32, self.if_filter.apply(s.im) as f32))
            .collect();

        let factor = self.downsample_factor();
        let decimated = decimate(&filtered, factor);
        let if_rate = f64::from(self.sample_rate_hz) / factor as f64;

        let mut demodulated = Vec::with_capacity(decimated.len());
        for &s in &decimated {
            let s64 = Complex64::new(f64::from(s.re), f64::from(s.im));
            let diff = s64 * self.prev_sample.conj();
            self.prev_sample = s64;
            demodulated.push(diff.im.atan2(diff.re));
        }
        let baseband_level = level_db(&demodulated);

        let resample_factor = (if_rate / f64::from(self.pcm_rate_hz)).max(1.0) as usize;
        let audio: Vec<f64> = demodulated
            .chunks(resample_factor.max(1))
            .map(|chunk| chunk.iter().copied().sum::<f64>() / chunk.len() as f64 * 0.5)
            .collect();

        DemodOutput { audio, if_level, baseband_level, stereo_detected: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowband_output_is_mono_and_bounded() {
        let mut decoder = NarrowbandFmDecoder::new(1_000_000, 48_000);
        let samples: Vec<IqSample> =
            (0..4096).map(|i| IqSample::new((i as f32 * 0.02).sin(), (i as f32 * 0.02).cos())).collect();
        let out = decoder.process(&samples);
        assert!(!out.stereo_detected);
        for sample in out.audio {
            assert!(sample.abs() <= 1.0);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut decoder = NarrowbandFmDecoder::new(1_000_000, 48_000);
        assert!(decoder.process(&[]).audio.is_empty());
    }
}
