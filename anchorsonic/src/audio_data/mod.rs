//! Decoded audio buffers and the loaders that produce them.

mod default_loader;
mod load_options;
mod loader;
mod resampler;

use crate::error::{AnchorSonicError, Result};
pub use default_loader::DefaultAudioLoader;
pub use load_options::{ConvertToMono, LoadOptions, NormalizationMode};
pub use loader::AudioDataLoader;
pub use resampler::AudioResampler;
use std::sync::Arc;
use std::time::Duration;

/// Peak level that dynamic normalization scales assets to (-1 dBFS).
const NORMALIZED_PEAK: f32 = 0.891;

/// Container for decoded audio with reference-counted sharing.
///
/// Samples are stored **interleaved** (`[L0, R0, L1, R1, ...]` for stereo), which is
/// what decoders produce and what the renderer walks frame by frame.
#[derive(Debug, Clone)]
pub struct AnchorSonicAudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
pub(crate) struct AudioDataInner {
    /// Interleaved samples; length is `total_frames * channels`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
    pub total_frames: usize,
}

impl AnchorSonicAudioData {
    pub(crate) fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let total_frames = samples.len() / channels.max(1) as usize;
        let duration = Duration::from_secs_f64(total_frames as f64 / sample_rate.max(1) as f64);
        Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channels,
                duration,
                total_frames,
            }),
        }
    }

    /// Wraps already-decoded interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate or channel count is zero, or if the sample
    /// count is not a whole number of frames.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Arc<Self>> {
        if sample_rate == 0 || channels == 0 {
            return Err(AnchorSonicError::AudioFormat(
                "sample rate and channel count must be greater than 0".into(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(AnchorSonicError::AudioFormat(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Arc::new(Self::new(samples, sample_rate, channels)))
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Mono downmix of one frame; out-of-range frames are silent.
    #[inline]
    pub fn mono_frame(&self, frame: usize) -> f32 {
        let channels = self.inner.channels as usize;
        let start = frame * channels;
        match self.inner.samples.get(start..start + channels) {
            Some(frame) => frame.iter().sum::<f32>() / channels as f32,
            None => 0.0,
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.inner
            .samples
            .iter()
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
    }

    /// Convert to mono by averaging all channels
    pub fn to_mono(&self) -> Self {
        if self.inner.channels == 1 {
            return self.clone();
        }
        let mono_samples: Vec<f32> = (0..self.inner.total_frames)
            .map(|frame| self.mono_frame(frame))
            .collect();
        Self::new(mono_samples, self.inner.sample_rate, 1)
    }

    /// Returns a copy scaled according to `mode`.
    pub fn normalized(&self, mode: NormalizationMode) -> Self {
        match mode {
            NormalizationMode::None => self.clone(),
            NormalizationMode::Dynamic => {
                let peak = self.peak();
                if peak <= f32::EPSILON {
                    return self.clone();
                }
                let gain = NORMALIZED_PEAK / peak;
                let scaled = self.inner.samples.iter().map(|s| s * gain).collect();
                Self::new(scaled, self.inner.sample_rate, self.inner.channels)
            }
        }
    }

    /// Resample to a different sample rate using rubato, returns a new instance
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;

        let resampled_samples = resampler.resample_interleaved(&self.inner.samples)?;
        Ok(Self::new(
            resampled_samples,
            target_sample_rate,
            self.inner.channels,
        ))
    }
}
