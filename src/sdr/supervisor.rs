// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Radio supervisor (C10): ties the SDR source, bounded sample queues, and
//! demodulator pipeline together behind `(mode, frequency_hz, mux, is_on)`.
//!
//! Three worker threads (reader/processor/output) run for the lifetime of
//! the supervisor regardless of on/off state; they spin-sleep when idle
//! rather than being spawned and joined per power cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::demod::{BroadcastFmDecoder, Demodulator, NarrowbandFmDecoder};
use crate::external::AudioSink;
use crate::sdr::queue::SampleQueue;
use crate::sdr::source::{IqSample, SdrDevice};
use crate::Result;

const IDLE_SLEEP: Duration = Duration::from_millis(20);

/// Current receive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Off,
    Am,
    Fm,
    Vhf,
    Gmrs,
    Aux,
}

/// Stereo/mono output routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMux {
    Mono,
    Stereo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputSource {
    Sdr,
    Aux,
}

struct State {
    mode: RadioMode,
    frequency_hz: u32,
    mux: RadioMux,
    is_on: bool,
    source: InputSource,
    decoder: Option<Box<dyn Demodulator>>,
}

fn build_decoder(mode: RadioMode, sample_rate_hz: u32, pcm_rate_hz: u32) -> Option<Box<dyn Demodulator>> {
    match mode {
        RadioMode::Fm => Some(Box::new(BroadcastFmDecoder::new(sample_rate_hz, pcm_rate_hz))),
        RadioMode::Vhf | RadioMode::Gmrs => {
            Some(Box::new(NarrowbandFmDecoder::new(sample_rate_hz, pcm_rate_hz)))
        }
        RadioMode::Off | RadioMode::Am | RadioMode::Aux => None,
    }
}

/// Owns the current radio state and the three SDR pipeline worker threads.
pub struct RadioSupervisor<S: SdrDevice> {
    state: Mutex<State>,
    sdr: Mutex<S>,
    iq_queue: SampleQueue<IqSample>,
    audio_queue: SampleQueue<f64>,
    sink: Mutex<Box<dyn AudioSink>>,
    running: Arc<AtomicBool>,
    skip_next_block: AtomicBool,
    sample_rate_hz: u32,
    pcm_rate_hz: u32,
}

impl<S: SdrDevice + 'static> RadioSupervisor<S> {
    #[must_use]
    pub fn new(sample_rate_hz: u32, pcm_rate_hz: u32, sdr: S, sink: Box<dyn AudioSink>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                mode: RadioMode::Off,
                frequency_hz: 0,
                mux: RadioMux::Mono,
                is_on: false,
                source: InputSource::Sdr,
                decoder: None,
            }),
            sdr: Mutex::new(sdr),
            iq_queue: SampleQueue::new(),
            audio_queue: SampleQueue::new(),
            sink: Mutex::new(sink),
            running: Arc::new(AtomicBool::new(true)),
            skip_next_block: AtomicBool::new(false),
            sample_rate_hz,
            pcm_rate_hz,
        })
    }

    /// Turn the radio on/off. Does not itself change mode or frequency.
    pub fn set_power(&self, on: bool) {
        let mut state = self.state.lock();
        state.is_on = on;
        if !on {
            state.decoder = None;
            state.mux = RadioMux::Mono;
        }
    }

    /// Retune and/or change mode.
    ///
    /// 1. If off, updates state only (no device I/O).
    /// 2. Else, if `mode`/`freq_hz` changed or `force` is set: destroys the
    ///    current decoder, resets the SDR buffer, flushes both queues,
    ///    tunes the SDR to `freq_hz + 0.25 * sample_rate`, constructs the
    ///    decoder appropriate for `mode`, and routes the reader/processor
    ///    at the chosen input source.
    pub fn set_frequency_and_mode(&self, mode: RadioMode, freq_hz: u32, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        if !state.is_on {
            state.mode = mode;
            state.frequency_hz = freq_hz;
            return Ok(());
        }

        let changed = state.mode != mode || state.frequency_hz != freq_hz;
        if !changed && !force {
            return Ok(());
        }

        state.decoder = None;
        self.iq_queue.flush();
        self.audio_queue.flush();

        let tuned_freq = freq_hz + (0.25 * f64::from(self.sample_rate_hz)) as u32;
        {
            let mut sdr = self.sdr.lock();
            sdr.reset_buffer()?;
            sdr.set_frequency(tuned_freq)?;
        }

        state.mode = mode;
        state.frequency_hz = freq_hz;
        state.mux = RadioMux::Mono;
        state.source = if mode == RadioMode::Aux { InputSource::Aux } else { InputSource::Sdr };
        state.decoder = build_decoder(mode, self.sample_rate_hz, self.pcm_rate_hz);
        self.skip_next_block.store(true, Ordering::SeqCst);

        log::info!("radio supervisor: retuned to {mode:?} @ {tuned_freq} Hz");
        Ok(())
    }

    #[must_use]
    pub fn mode(&self) -> RadioMode {
        self.state.lock().mode
    }

    #[must_use]
    pub fn mux(&self) -> RadioMux {
        self.state.lock().mux
    }

    #[must_use]
    pub fn frequency(&self) -> u32 {
        self.state.lock().frequency_hz
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state.lock().is_on
    }

    #[must_use]
    pub fn queued_audio_samples(&self) -> usize {
        self.audio_queue.queued_samples()
    }

    /// Stop all worker threads at their next suspension point.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.iq_queue.push_end();
        self.audio_queue.push_end();
    }

    /// Spawn the reader/processor/output worker threads.
    pub fn spawn(self: &Arc<Self>) -> Result<[thread::JoinHandle<()>; 3]> {
        let reader = {
            let sup = self.clone();
            thread::Builder::new().name("sdr-reader".to_string()).spawn(move || sup.reader_loop())?
        };
        let processor = {
            let sup = self.clone();
            thread::Builder::new().name("sdr-processor".to_string()).spawn(move || sup.processor_loop())?
        };
        let output = {
            let sup = self.clone();
            thread::Builder::new().name("sdr-output".to_string()).spawn(move || sup.output_loop())?
        };
        Ok([reader, processor, output])
    }

    fn reader_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let should_read = {
                let state = self.state.lock();
                state.is_on && state.source == InputSource::Sdr
            };
            if !should_read {
                thread::sleep(IDLE_SLEEP);
                continue;
            }
            let block = {
                let mut sdr = self.sdr.lock();
                sdr.read_block()
            };
            match block {
                Ok(samples) => self.iq_queue.push(samples),
                Err(e) => {
                    log::warn!("sdr reader: {e}");
                    thread::sleep(IDLE_SLEEP);
                }
            }
        }
    }

    fn processor_loop(self: Arc<Self>) {
        loop {
            let block = self.iq_queue.pull();
            if block.is_empty() {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                continue;
            }
            if self.skip_next_block.swap(false, Ordering::SeqCst) {
                continue;
            }
            let mut state = self.state.lock();
            let Some(decoder) = state.decoder.as_mut() else { continue };
            let out = decoder.process(&block);
            state.mux = if out.stereo_detected { RadioMux::Stereo } else { RadioMux::Mono };
            drop(state);
            self.audio_queue.push(out.audio);
        }
    }

    fn output_loop(self: Arc<Self>) {
        let min_fill = 2 * self.pcm_rate_hz as usize;
        loop {
            self.audio_queue.wait_buffer_fill(min_fill);
            let block = self.audio_queue.pull();
            if block.is_empty() && !self.running.load(Ordering::SeqCst) {
                return;
            }
            let mut sink = self.sink.lock();
            for pair in block.chunks_exact(2) {
                if let Err(e) = sink.write_frame(pair[0], pair[1]) {
                    log::warn!("audio sink: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::MemoryAudioSink;
    use crate::Error;

    struct FakeSdr {
        frequency_hz: u32,
        reset_count: u32,
    }

    impl SdrDevice for FakeSdr {
        fn set_frequency(&mut self, freq_hz: u32) -> Result<()> {
            self.frequency_hz = freq_hz;
            Ok(())
        }

        fn reset_buffer(&mut self) -> Result<()> {
            self.reset_count += 1;
            Ok(())
        }

        fn read_block(&mut self) -> Result<Vec<IqSample>> {
            Err(Error::DeviceOpenFailed("no fixture data".to_string()))
        }

        fn block_length(&self) -> usize {
            4096
        }
    }

    fn supervisor() -> Arc<RadioSupervisor<FakeSdr>> {
        let sdr = FakeSdr { frequency_hz: 0, reset_count: 0 };
        RadioSupervisor::new(1_000_000, 48_000, sdr, Box::new(MemoryAudioSink::default()))
    }

    #[test]
    fn off_radio_updates_state_without_touching_device() {
        let sup = supervisor();
        sup.set_frequency_and_mode(RadioMode::Fm, 97_500_000, false).unwrap();
        assert_eq!(sup.mode(), RadioMode::Fm);
        assert_eq!(sup.frequency(), 97_500_000);
        assert_eq!(sup.mux(), RadioMux::Mono);
    }

    #[test]
    fn retune_while_on_applies_quarter_sample_rate_offset() {
        let sup = supervisor();
        sup.set_power(true);
        sup.set_frequency_and_mode(RadioMode::Fm, 97_500_000, false).unwrap();
        let tuned = sup.sdr.lock().frequency_hz;
        assert_eq!(tuned, 97_500_000 + 250_000);
        assert_eq!(sup.mux(), RadioMux::Mono, "mux resets to mono until stereo re-detected");
    }

    #[test]
    fn unchanged_retune_without_force_is_a_no_op() {
        let sup = supervisor();
        sup.set_power(true);
        sup.set_frequency_and_mode(RadioMode::Fm, 97_500_000, false).unwrap();
        let resets_before = sup.sdr.lock().reset_count;
        sup.set_frequency_and_mode(RadioMode::Fm, 97_500_000, false).unwrap();
        assert_eq!(sup.sdr.lock().reset_count, resets_before);
    }

    #[test]
    fn am_mode_has_no_decoder() {
        let sup = supervisor();
        sup.set_power(true);
        sup.set_frequency_and_mode(RadioMode::Am, 640_000, false).unwrap();
        assert!(sup.state.lock().decoder.is_none());
    }

    #[test]
    fn fm_mode_constructs_a_decoder() {
        let sup = supervisor();
        sup.set_power(true);
        sup.set_frequency_and_mode(RadioMode::Fm, 97_500_000, false).unwrap();
        assert!(sup.state.lock().decoder.is_some());
    }
}
