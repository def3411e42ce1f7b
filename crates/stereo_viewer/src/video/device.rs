//! Playback on the default output device through cpal.
//!
//! The cpal stream is not `Send` on every host, so a dedicated thread owns it
//! for the lifetime of the output. Scheduled chunks land in a shared sample
//! queue the device callback drains; underruns play silence.

use super::{
    audio::{AudioFormat, AudioOutput},
    AudioChunk,
};
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc, thread};

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

pub struct CpalAudioOutput {
    format: AudioFormat,
    queue: SampleQueue,
    scheduled_frames: u64,
    /// Dropping this ends the stream thread.
    stop: Option<Sender<()>>,
}

impl CpalAudioOutput {
    /// Reads the default device's native format. The stream itself is opened
    /// by [`AudioOutput::start`].
    pub fn open() -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::Start("no default output device".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Start(e.to_string()))?;
        Ok(Self::with_format(AudioFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        }))
    }

    fn with_format(format: AudioFormat) -> Self {
        Self {
            format,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            scheduled_frames: 0,
            stop: None,
        }
    }

    /// Samples waiting for the device callback.
    pub fn queued_samples(&self) -> usize {
        self.queue.lock().len()
    }
}

impl AudioOutput for CpalAudioOutput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if self.stop.is_some() {
            return Ok(());
        }
        if self.format.channels == 0 || self.format.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat {
                channels: self.format.channels,
                sample_rate: self.format.sample_rate,
            });
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let queue = self.queue.clone();
        let format = self.format;

        thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let stream = match play_default(format, queue) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until the output is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::Start(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::Start("audio thread exited".into()))??;
        self.stop = Some(stop_tx);
        log::info!(
            "Audio output started ({} Hz, {} ch)",
            self.format.sample_rate,
            self.format.channels
        );
        Ok(())
    }

    fn schedule(&mut self, chunk: AudioChunk) {
        self.scheduled_frames += chunk.frames() as u64;
        self.queue.lock().extend(chunk.samples);
    }

    fn scheduled_secs(&self) -> f64 {
        self.scheduled_frames as f64 / f64::from(self.format.sample_rate.max(1))
    }
}

fn play_default(format: AudioFormat, queue: SampleQueue) -> Result<cpal::Stream, AudioError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::Start("no default output device".into()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Start(e.to_string()))?;
    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, queue),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, queue),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, queue),
        other => return Err(AudioError::Start(format!("unsupported sample format {other}"))),
    }?;
    stream.play().map_err(|e| AudioError::Start(e.to_string()))?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: SampleQueue,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| fill(&mut queue.lock(), data),
            |err| log::error!("Audio stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::Start(e.to_string()))
}

/// Moves queued samples into the device buffer, padding with silence.
fn fill<T: cpal::FromSample<f32>>(queue: &mut VecDeque<f32>, data: &mut [T]) {
    for out in data.iter_mut() {
        *out = T::from_sample_(queue.pop_front().unwrap_or(0.0));
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.stop.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_drains_in_order_then_plays_silence() {
        let mut queue: VecDeque<f32> = [0.25, -0.5, 1.0].into_iter().collect();
        let mut data = [9.0f32; 5];
        fill(&mut queue, &mut data);
        assert_eq!(data, [0.25, -0.5, 1.0, 0.0, 0.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn fill_converts_to_integer_formats() {
        let mut queue: VecDeque<f32> = [0.0, 1.0].into_iter().collect();
        let mut data = [1i16; 2];
        fill(&mut queue, &mut data);
        assert_eq!(data[0], 0);
        assert!(data[1] > 32_000);
    }

    #[test]
    fn schedule_queues_device_samples() {
        let mut out = CpalAudioOutput::with_format(AudioFormat::default());
        out.schedule(AudioChunk {
            pts: 0.0,
            sample_rate: 48_000,
            channels: 2,
            samples: vec![0.0; 960],
        });
        assert_eq!(out.queued_samples(), 960);
        assert!((out.scheduled_secs() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn zero_channel_format_fails_before_touching_the_device() {
        let mut out = CpalAudioOutput::with_format(AudioFormat {
            sample_rate: 48_000,
            channels: 0,
        });
        assert!(matches!(out.start(), Err(AudioError::UnsupportedFormat { .. })));
    }
}
