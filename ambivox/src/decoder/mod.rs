//! Turning audio files into PCM the backend can take.
//!
//! Decoders implement [`WaveDecoder`]. The default one, [`SymphoniaDecoder`],
//! reads anything symphonia can probe and returns interleaved f32 samples,
//! mixed down and resampled as [`DecodeOptions`] asks.

mod options;
mod resampler;
mod symphonia_decoder;

use crate::error::Result;
use std::path::Path;
use std::time::Duration;

pub use options::{ConvertToMono, DecodeOptions};
pub use resampler::Resampler;
pub use symphonia_decoder::SymphoniaDecoder;

/// Decoded PCM.
///
/// Samples are **interleaved**: `[L0, R0, L1, R1, ...]` for stereo.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Averages all channels into one.
    pub fn into_mono(self) -> Self {
        if self.channels <= 1 {
            return self;
        }
        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::new(samples, self.sample_rate, 1)
    }

    /// Keeps the first `max` channels of every frame.
    pub fn truncate_channels(self, max: u16) -> Self {
        if max == 0 || self.channels <= max {
            return self;
        }
        let samples = self
            .samples
            .chunks(self.channels as usize)
            .flat_map(|frame| frame[..max as usize].iter().copied())
            .collect();
        Self::new(samples, self.sample_rate, max)
    }

    pub fn resample(self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.sample_rate || self.is_empty() {
            return Ok(self);
        }
        let resampler = Resampler::new(self.sample_rate, target_sample_rate, self.channels, None)?;
        let samples = resampler.resample_interleaved(&self.samples)?;
        Ok(Self::new(samples, target_sample_rate, self.channels))
    }

    /// Applies channel conversion and resampling from `options`.
    pub fn convert(self, options: &DecodeOptions) -> Result<Self> {
        let mut audio = match options.convert_to_mono {
            ConvertToMono::ForceMono => self.into_mono(),
            ConvertToMono::Original => self,
        };
        if let Some(max) = options.max_channels {
            audio = audio.truncate_channels(max);
        }
        match options.target_sample_rate {
            Some(rate) => audio.resample(rate),
            None => Ok(audio),
        }
    }
}

/// Loads audio files into PCM.
///
/// Bring your own implementation for formats or containers the default
/// decoder doesn't handle.
pub trait WaveDecoder: Send + Sync {
    fn decode(&self, path: &Path, options: &DecodeOptions) -> Result<DecodedAudio>;
}
