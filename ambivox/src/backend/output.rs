use super::SoftwareMixer;
use crate::error::{AmbivoxError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Device settings for an [`OutputStream`].
#[derive(Debug, Clone)]
pub struct OutputDesc {
    /// Number of output channels (typically 2 for stereo)
    pub channels: u16,
    /// Frames per device callback
    pub block_size: usize,
}

impl Default for OutputDesc {
    fn default() -> Self {
        Self {
            channels: 2,
            block_size: 1024,
        }
    }
}

/// Plays a [`SoftwareMixer`] on the default cpal output device.
///
/// The device callback only ever `try_lock`s the mix state, so the tick
/// thread is never blocked by audio I/O.
pub struct OutputStream {
    desc: OutputDesc,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
}

impl OutputStream {
    pub fn new(desc: OutputDesc) -> Self {
        Self {
            desc,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Opens the default device at the mixer's frequency and starts pulling frames.
    pub fn start(&mut self, mixer: SoftwareMixer) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let frequency = mixer.frequency();
        if frequency == 0 {
            return Err(AmbivoxError::AudioDevice(
                "Mixer backend has not been opened".into(),
            ));
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            AmbivoxError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.channels,
            sample_rate: cpal::SampleRate(frequency),
            buffer_size: cpal::BufferSize::Fixed(self.desc.block_size as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            AmbivoxError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config, mixer)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config, mixer)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config, mixer)?,
            _ => {
                return Err(AmbivoxError::AudioFormat(
                    "Unsupported sample format".into(),
                ));
            }
        };

        stream
            .play()
            .map_err(|e| AmbivoxError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "Output stream started ({} Hz, {} channels, block {})",
            frequency,
            self.desc.channels,
            self.desc.block_size
        );
        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Output stream stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Number of frames rendered since start
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mixer: SoftwareMixer,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let channels = config.channels;
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    scratch.resize(data.len(), 0.0);
                    mixer.render(&mut scratch, channels);

                    for (out, value) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(value.clamp(-1.0, 1.0));
                    }

                    frames_processed.fetch_add(data.len() / channels as usize, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AmbivoxError::AudioDevice(format!("Failed to build stream: {}", e)))
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.stop();
    }
}
