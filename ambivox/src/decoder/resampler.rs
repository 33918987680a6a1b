use crate::error::{AmbivoxError, Result};
use rubato::{FftFixedIn, Resampler as _};

/// Offline sample-rate converter for whole clips.
pub struct Resampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl Resampler {
    /// `chunk_size` defaults to 1024 input frames per FFT block.
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(AmbivoxError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(AmbivoxError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Target over source rate; above 1.0 means upsampling.
    pub fn ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }

    /// Resamples interleaved samples and returns interleaved output.
    ///
    /// The output is trimmed to `frames * ratio` so padding of the last
    /// block doesn't add a tail of silence.
    pub fn resample_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved.to_vec());
        }

        let channels = self.channels as usize;
        let frames = interleaved.len() / channels;
        let planar: Vec<Vec<f32>> = (0..channels)
            .map(|ch| interleaved.chunks(channels).map(|frame| frame[ch]).collect())
            .collect();

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2,
            channels,
        )
        .map_err(|e| AmbivoxError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];
        let mut position = 0;
        while position < frames {
            let needed = resampler.input_frames_next();
            let take = (frames - position).min(needed);
            let block: Vec<Vec<f32>> = planar
                .iter()
                .map(|channel| {
                    let mut chunk = vec![0.0f32; needed];
                    chunk[..take].copy_from_slice(&channel[position..position + take]);
                    chunk
                })
                .collect();

            let resampled = resampler
                .process(&block, None)
                .map_err(|e| AmbivoxError::AudioLoading(format!("Resampling error: {}", e)))?;
            for (out, channel) in output.iter_mut().zip(resampled) {
                out.extend_from_slice(&channel);
            }
            position += take;
        }

        let expected = (frames as f64 * self.ratio()).round() as usize;
        let produced = output.first().map(Vec::len).unwrap_or(0).min(expected);

        let mut interleaved_out = Vec::with_capacity(produced * channels);
        for frame in 0..produced {
            for channel in &output {
                interleaved_out.push(channel[frame]);
            }
        }
        Ok(interleaved_out)
    }
}
