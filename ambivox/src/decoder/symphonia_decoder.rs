use super::{DecodeOptions, DecodedAudio, WaveDecoder};
use crate::error::{AmbivoxError, Result};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// [`WaveDecoder`] backed by symphonia (WAV, OGG/Vorbis, FLAC, MP3, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }

    fn read_pcm(path: &Path) -> Result<DecodedAudio> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AmbivoxError::AudioLoading(format!("Failed to probe audio format: {:?}", e)))?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| AmbivoxError::AudioLoading("No default audio track found".to_string()))?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AmbivoxError::AudioLoading("Sample rate not found".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| AmbivoxError::AudioLoading("Channel count not found".to_string()))?
            .count() as u16;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AmbivoxError::AudioLoading(format!("Failed to create decoder: {:?}", e)))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                // end of stream
                Err(Error::IoError(_)) => break,
                Err(e) => {
                    return Err(AmbivoxError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                // recoverable corruption
                Err(Error::DecodeError(_)) => continue,
                Err(e) => {
                    return Err(AmbivoxError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        Ok(DecodedAudio::new(samples, sample_rate, channels))
    }
}

impl WaveDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, options: &DecodeOptions) -> Result<DecodedAudio> {
        let audio = Self::read_pcm(path)?;
        if audio.is_empty() {
            return Err(AmbivoxError::AudioLoading(format!(
                "'{}' contains no samples",
                path.display()
            )));
        }
        log::debug!(
            "Decoded '{}': {} Hz, {} channel(s), {:.2}s",
            path.display(),
            audio.sample_rate,
            audio.channels,
            audio.duration().as_secs_f32()
        );
        audio.convert(options)
    }
}
