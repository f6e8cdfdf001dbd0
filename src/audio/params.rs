use crate::foundation::core::Rational;
use crate::foundation::error::{FrameCacheError, FrameCacheResult};

/// Interleaved sample encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    Mono,
    Stereo,
    #[serde(rename = "5.1")]
    Surround51,
    #[serde(rename = "7.1")]
    Surround71,
}

impl ChannelLayout {
    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Surround51 => 6,
            ChannelLayout::Surround71 => 8,
        }
    }
}

/// Sample rate, layout and format of an audio buffer.
///
/// A "sample" here is one sample frame: one value per channel. All conversions are exact integer
/// arithmetic; times are floored to whole samples and negative times count as zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioRenderingParams {
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub format: SampleFormat,
}

impl AudioRenderingParams {
    pub fn new(
        sample_rate: u32,
        channel_layout: ChannelLayout,
        format: SampleFormat,
    ) -> FrameCacheResult<Self> {
        if sample_rate == 0 {
            return Err(FrameCacheError::validation("sample rate must be > 0"));
        }
        Ok(Self {
            sample_rate,
            channel_layout,
            format,
        })
    }

    pub fn bytes_per_sample_frame(&self) -> usize {
        self.channel_layout.channel_count() * self.format.bytes_per_sample()
    }

    pub fn time_to_samples(&self, time: Rational) -> usize {
        let scaled = i128::from(time.num()) * i128::from(self.sample_rate);
        let samples = scaled.div_euclid(i128::from(time.den()));
        usize::try_from(samples.max(0)).unwrap_or(usize::MAX)
    }

    pub fn time_to_bytes(&self, time: Rational) -> usize {
        self.samples_to_bytes(self.time_to_samples(time))
    }

    pub fn bytes_to_samples(&self, bytes: usize) -> usize {
        bytes / self.bytes_per_sample_frame()
    }

    pub fn samples_to_bytes(&self, samples: usize) -> usize {
        samples.saturating_mul(self.bytes_per_sample_frame())
    }
}

impl Default for AudioRenderingParams {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channel_layout: ChannelLayout::Stereo,
            format: SampleFormat::F32,
        }
    }
}
