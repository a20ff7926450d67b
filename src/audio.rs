//! Live output
//!
//! [`LivePlayback`] is the real-time half of a session: it lives inside the
//! output callback, pulls one evaluator sample per frame and copies it to
//! every channel. [`AudioDevice`] wires it to the default cpal output.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex, TryLockError,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, SizedSample,
};
use rtrb::{Consumer, PushError, Producer, RingBuffer};

use crate::{
    evaluator::{Evaluator, Variable},
    Error, Result,
};

/// Messages from the controller to the audio callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Raw MIDI message: status byte and two data bytes.
    Midi([u8; 3]),
}

/// Pad or truncate a raw MIDI message to three bytes. Missing data bytes
/// read as zero; an empty message is ignored.
pub fn midi_packet(data: &[u8]) -> Option<[u8; 3]> {
    let (&status, rest) = data.split_first()?;
    let mut packet = [status, 0, 0];
    for (slot, &byte) in packet[1..].iter_mut().zip(rest) {
        *slot = byte;
    }
    Some(packet)
}

/// Latest pointer position, shared between controller and callback.
///
/// Writers overwrite, the callback applies whatever is newest at the start
/// of its next block.
#[derive(Debug, Default)]
pub(crate) struct PointerState {
    x: AtomicU32,
    y: AtomicU32,
    dirty: AtomicBool,
}

impl PointerState {
    pub(crate) fn store(&self, x: f32, y: f32) {
        self.x.store(x.to_bits(), Ordering::Relaxed);
        self.y.store(y.to_bits(), Ordering::Relaxed);
        self.dirty.store(true, Ordering::Release);
    }

    fn take(&self) -> Option<(f32, f32)> {
        if !self.dirty.swap(false, Ordering::Acquire) {
            return None;
        }
        Some((
            f32::from_bits(self.x.load(Ordering::Relaxed)),
            f32::from_bits(self.y.load(Ordering::Relaxed)),
        ))
    }
}

/// Callback-side state of the live evaluator.
pub struct LivePlayback<V: Evaluator> {
    evaluator: Arc<Mutex<V>>,
    controls: Consumer<ControlMessage>,
    pointer: Arc<PointerState>,
    routed: Arc<AtomicBool>,
    tap: Option<Producer<f32>>,
}

impl<V: Evaluator> LivePlayback<V> {
    pub(crate) fn new(
        evaluator: Arc<Mutex<V>>,
        controls: Consumer<ControlMessage>,
        pointer: Arc<PointerState>,
        routed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            evaluator,
            controls,
            pointer,
            routed,
            tap: None,
        }
    }

    /// Install a ring that receives a copy of every produced mono sample.
    ///
    /// Samples are dropped when the ring is full. Replaces any earlier tap.
    pub fn tap(&mut self, capacity: usize) -> Consumer<f32> {
        let (producer, consumer) = RingBuffer::new(capacity);
        self.tap = Some(producer);
        consumer
    }

    /// Whether the evaluator is currently routed to the output.
    pub fn is_routed(&self) -> bool {
        self.routed.load(Ordering::Acquire)
    }

    /// Fill an interleaved output buffer.
    ///
    /// Pending pointer and MIDI updates are applied first. While not routed,
    /// or while the controller holds the evaluator, the buffer is silenced
    /// and the evaluator is not advanced.
    pub fn process<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = channels.max(1);
        let mut evaluator = match self.evaluator.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                silence(data);
                return;
            }
        };

        if let Some((x, y)) = self.pointer.take() {
            evaluator.set_variable(Variable::X.name(), x);
            evaluator.set_variable(Variable::Y.name(), y);
        }
        while let Ok(message) = self.controls.pop() {
            match message {
                ControlMessage::Midi(packet) => evaluator.midi(packet),
            }
        }

        if !self.routed.load(Ordering::Acquire) {
            silence(data);
            return;
        }

        let mut tap = self.tap.as_mut();
        for frame in data.chunks_mut(channels) {
            let s = evaluator.eval();
            for sample in frame.iter_mut() {
                *sample = T::from_sample(s);
            }
            if let Some(producer) = tap.as_deref_mut() {
                if let Err(PushError::Full(_)) = producer.push(s) {
                    tap = None; // drop remainder if full
                }
            }
        }
    }
}

fn silence<T: SizedSample + FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}

/// The default output device and its preferred configuration.
pub struct AudioDevice {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
}

impl AudioDevice {
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(Error::NoOutputDevice)?;
        let config = device.default_output_config()?;
        Ok(Self { device, config })
    }

    pub fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".into())
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Build and start the output stream driven by `playback`.
    pub fn start<V: Evaluator>(self, playback: LivePlayback<V>) -> Result<OutputStream> {
        let sample_rate = self.sample_rate();
        let channels = self.channels();
        let config: cpal::StreamConfig = self.config.clone().into();

        let stream = match self.config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32, V>(&self.device, &config, playback)?,
            cpal::SampleFormat::I16 => build_stream::<i16, V>(&self.device, &config, playback)?,
            cpal::SampleFormat::U16 => build_stream::<u16, V>(&self.device, &config, playback)?,
            sample_format => return Err(Error::UnsupportedFormat(sample_format)),
        };
        stream.play()?;

        tracing::info!(device = %self.name(), sample_rate, channels, "output stream started");
        Ok(OutputStream {
            _stream: stream,
            sample_rate,
            channels,
        })
    }
}

/// A running output stream. Audio stops when this is dropped.
pub struct OutputStream {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn build_stream<T, V>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut playback: LivePlayback<V>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
    V: Evaluator,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| playback.process(data, channels),
        |err| tracing::error!(%err, "output stream error"),
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{
        testing::{ScriptedEngine, ScriptedEvaluator},
        Engine,
    };

    struct Rig {
        playback: LivePlayback<ScriptedEvaluator>,
        controls: Producer<ControlMessage>,
        pointer: Arc<PointerState>,
        routed: Arc<AtomicBool>,
        evaluator: Arc<Mutex<ScriptedEvaluator>>,
    }

    fn rig() -> Rig {
        let mut evaluator = ScriptedEngine::default().create().unwrap();
        evaluator.compile("t").unwrap();
        let evaluator = Arc::new(Mutex::new(evaluator));
        let (controls, controls_rx) = RingBuffer::new(8);
        let pointer = Arc::new(PointerState::default());
        let routed = Arc::new(AtomicBool::new(false));
        let playback = LivePlayback::new(
            evaluator.clone(),
            controls_rx,
            pointer.clone(),
            routed.clone(),
        );
        Rig {
            playback,
            controls,
            pointer,
            routed,
            evaluator,
        }
    }

    fn routed_rig() -> Rig {
        let rig = rig();
        rig.routed.store(true, Ordering::Release);
        rig
    }

    #[test]
    fn silent_and_paused_while_not_routed() {
        let mut rig = rig();
        let mut data = [1.0f32; 8];
        rig.playback.process(&mut data, 2);
        assert!(data.iter().all(|&s| s == 0.0));

        rig.routed.store(true, Ordering::Release);
        rig.playback.process(&mut data, 2);
        // evaluator did not advance during the silent block
        assert_eq!(data[0], -1.0);
    }

    #[test]
    fn duplicates_mono_into_every_channel_in_order() {
        let mut rig = routed_rig();

        let mut data = [0.0f32; 6];
        rig.playback.process(&mut data, 3);

        assert_eq!(data[0..3], [-1.0; 3]);
        assert_eq!(data[3..6], [-127.0 / 128.0; 3]);
    }

    #[test]
    fn tap_receives_one_sample_per_frame() {
        let mut rig = routed_rig();
        let mut tap = rig.playback.tap(16);

        let mut data = [0.0f32; 8];
        rig.playback.process(&mut data, 2);

        let tapped: Vec<f32> = std::iter::from_fn(|| tap.pop().ok()).collect();
        assert_eq!(tapped.len(), 4);
        assert_eq!(tapped[0], data[0]);
        assert_eq!(tapped[3], data[6]);
    }

    #[test]
    fn newest_pointer_position_wins() {
        let mut rig = routed_rig();
        for i in 0..40 {
            let x = if i == 39 { 1.0 } else { 0.0 };
            rig.pointer.store(x, 0.5);
        }

        let mut data = [0.0f32; 2];
        rig.playback.process(&mut data, 1);

        // x = 1 quadruples the sawtooth step
        assert_eq!(data[1], (4.0 - 128.0) / 128.0);
    }

    #[test]
    fn pointer_applies_while_stopped() {
        let mut rig = rig();
        rig.pointer.store(1.0, 0.0);
        rig.playback.process(&mut [0.0f32; 4], 1);
        assert_eq!(rig.evaluator.lock().unwrap().x, 1.0);
    }

    #[test]
    fn forwards_midi_in_order() {
        let mut rig = routed_rig();
        rig.controls.push(ControlMessage::Midi([0x90, 60, 100])).unwrap();
        rig.controls.push(ControlMessage::Midi([0x80, 60, 0])).unwrap();

        rig.playback.process(&mut [0.0f32; 2], 1);

        let evaluator = rig.evaluator.lock().unwrap();
        assert_eq!(evaluator.midi, vec![[0x90, 60, 100], [0x80, 60, 0]]);
    }

    #[test]
    fn busy_evaluator_yields_silence_without_blocking() {
        let mut rig = routed_rig();
        rig.pointer.store(1.0, 0.0);
        rig.controls.push(ControlMessage::Midi([0x90, 64, 90])).unwrap();

        let held = rig.evaluator.lock().unwrap();
        let mut data = [1.0f32; 4];
        rig.playback.process(&mut data, 1);
        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(held.t, 0);
        drop(held);

        // pending updates are applied on the next block
        rig.playback.process(&mut data, 1);
        let evaluator = rig.evaluator.lock().unwrap();
        assert_eq!(evaluator.x, 1.0);
        assert_eq!(evaluator.midi, vec![[0x90, 64, 90]]);
        assert_eq!(evaluator.t, 4);
    }

    #[test]
    fn midi_packets_are_padded_to_three_bytes() {
        assert_eq!(midi_packet(&[0x90, 60, 100]), Some([0x90, 60, 100]));
        assert_eq!(midi_packet(&[0xC0, 5]), Some([0xC0, 5, 0]));
        assert_eq!(midi_packet(&[0xF0, 1, 2, 3, 0xF7]), Some([0xF0, 1, 2]));
        assert_eq!(midi_packet(&[]), None);
    }

    #[test]
    fn converts_to_integer_formats() {
        let mut rig = routed_rig();
        let mut data = [0i16; 2];
        rig.playback.process(&mut data, 1);
        assert_eq!(data[0], i16::MIN);
    }
}
