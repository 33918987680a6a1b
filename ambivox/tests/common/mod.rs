#![allow(dead_code)]

use ambivox::{
    AssetKind, AudioAsset, AudioContext, AudioDesc, DecodedAudio, SoftwareBackend,
    SoftwareBackendDesc, SoftwareMixer,
};
use std::path::Path;
use std::sync::Arc;

pub const RATE: u32 = 48000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Running context on the software backend with exactly `voices` mono voices.
pub fn software_context(voices: usize) -> (Arc<AudioContext>, SoftwareMixer) {
    init_logging();
    let backend = SoftwareBackend::new(SoftwareBackendDesc {
        max_voices: voices,
        stereo_voices: 0,
    });
    let mixer = backend.mixer();
    let desc = AudioDesc::new()
        .frequency(RATE)
        .mono_voices(voices)
        .stereo_voices(0);
    let context = AudioContext::new(desc, backend);
    assert!(context.initialize());
    (context, mixer)
}

/// Uploads a sine tone of `frames` frames.
pub fn tone(context: &AudioContext, name: &str, kind: AssetKind, frames: usize) -> Arc<AudioAsset> {
    let channels: u16 = match kind {
        AssetKind::Sound => 1,
        AssetKind::Music => 2,
    };
    let samples = (0..frames)
        .flat_map(|i| {
            let s = (i as f32 * 440.0 * std::f32::consts::TAU / RATE as f32).sin() * 0.5;
            std::iter::repeat_n(s, channels as usize)
        })
        .collect();
    AudioAsset::from_samples(context, name, kind, DecodedAudio::new(samples, RATE, channels))
        .unwrap()
}

/// Writes a 16-bit mono PCM WAV file of `frames` frames.
pub fn write_wav(path: &Path, frames: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample(((i % 100) as i16 - 50) * 200).unwrap();
    }
    writer.finalize().unwrap();
}
