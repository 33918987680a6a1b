/// Channel handling applied after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertToMono {
    /// Keep the file's channels
    #[default]
    Original,
    /// Average all channels into one
    ForceMono,
}

/// Options for [`WaveDecoder::decode`](super::WaveDecoder::decode).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    pub convert_to_mono: ConvertToMono,
    /// Resample to this rate when it differs from the file's rate
    pub target_sample_rate: Option<u32>,
    /// Keep at most this many channels (extra channels are dropped)
    pub max_channels: Option<u16>,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mono at `sample_rate`, the format positional sound effects are stored in.
    pub fn sound(sample_rate: u32) -> Self {
        Self::new()
            .convert_to_mono(ConvertToMono::ForceMono)
            .target_sample_rate(sample_rate)
    }

    /// Up to stereo at `sample_rate`, the format music tracks are stored in.
    pub fn music(sample_rate: u32) -> Self {
        Self::new().max_channels(2).target_sample_rate(sample_rate)
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }

    pub fn target_sample_rate(mut self, sample_rate: u32) -> Self {
        self.target_sample_rate = Some(sample_rate);
        self
    }

    pub fn max_channels(mut self, channels: u16) -> Self {
        self.max_channels = Some(channels);
        self
    }
}
