use crate::error::{AnchorSonicError, Result};
use crate::spatial::{ReverbPreset, SpatializerKind};
use std::time::Duration;

/// Where rendered blocks go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Nothing is attached to a device; the caller pulls blocks with
    /// [`AnchorSonicEngine::render_offline`](crate::engine::AnchorSonicEngine::render_offline).
    #[default]
    Offline,
    /// A render thread feeds the default output device through cpal.
    #[cfg(feature = "device-output")]
    Device,
}

/// Configuration descriptor for an AnchorSonic engine
#[derive(Debug, Clone)]
pub struct EngineDesc {
    /// Sample rate the engine renders at; registered assets are resampled to it
    pub sample_rate: u32,
    /// Number of frames rendered per processing block
    pub block_size: usize,
    /// Number of output channels of the active route (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Amount of rendered audio buffered ahead of the device callback
    pub buffer_duration: Duration,
    /// Maximum number of concurrently live sound events
    pub max_sound_events: usize,
    /// Room model used by the late reverb stage of spatial pipelines
    pub reverb_preset: ReverbPreset,
    /// Which spatializer renders the direct path
    pub spatializer: SpatializerKind,
    /// Optional path to a custom HRTF SOFA file (Steam Audio spatializer only)
    pub hrtf_path: Option<String>,
    /// SPL in dB that maps to unity gain for absolute calibration
    pub reference_spl_db: f32,
    pub output: OutputMode,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            buffer_duration: Duration::from_millis(40),
            max_sound_events: 16,
            reverb_preset: ReverbPreset::MediumRoom,
            spatializer: SpatializerKind::Panning,
            hrtf_path: None,
            reference_spl_db: 85.0,
            output: OutputMode::Offline,
        }
    }
}

impl EngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn buffer_duration(mut self, duration: Duration) -> Self {
        self.buffer_duration = duration;
        self
    }

    pub fn reverb_preset(mut self, preset: ReverbPreset) -> Self {
        self.reverb_preset = preset;
        self
    }

    pub fn spatializer(mut self, kind: SpatializerKind) -> Self {
        self.spatializer = kind;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Samples in one rendered block across all channels.
    pub fn block_len(&self) -> usize {
        self.block_size * self.channels as usize
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AnchorSonicError::Configuration(
                "sample rate must be greater than 0".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(AnchorSonicError::Configuration(
                "block size must be greater than 0".into(),
            ));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(AnchorSonicError::Configuration(format!(
                "unsupported output channel count {} (expected 1 or 2)",
                self.channels
            )));
        }
        if self.max_sound_events == 0 {
            return Err(AnchorSonicError::Configuration(
                "max_sound_events must be at least 1".into(),
            ));
        }
        if !self.reference_spl_db.is_finite() {
            return Err(AnchorSonicError::Configuration(
                "reference SPL must be finite".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_desc_is_valid() {
        assert!(EngineDesc::default().validate().is_ok());
        assert_eq!(EngineDesc::default().block_len(), 1024);
    }

    #[test]
    fn rejects_zero_and_surround_layouts() {
        assert!(EngineDesc::new().sample_rate(0).validate().is_err());
        assert!(EngineDesc::new().block_size(0).validate().is_err());
        assert!(EngineDesc::new().channels(6).validate().is_err());
        assert!(EngineDesc::new().channels(1).validate().is_ok());
    }
}
