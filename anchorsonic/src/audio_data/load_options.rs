/// Defines how to handle channel conversion during audio loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertToMono {
    /// Keep original channels: stereo if input is stereo, mono if input is mono.
    Original,

    /// Force mono: stereo input is averaged down to one channel.
    ///
    /// Spatialization derives the stereo image from the source position, so a mono
    /// source loses nothing.
    ForceMono,
}

/// Loudness handling applied when an asset is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    /// Samples are used as decoded
    None,
    /// Samples are scaled so the asset peaks just below full scale
    #[default]
    Dynamic,
}

/// Options for controlling audio file loading behavior.
///
/// # Examples
///
/// ```no_run
/// # use anchorsonic::audio_data::{LoadOptions, ConvertToMono};
/// let options = LoadOptions::new()
///     .convert_to_mono(ConvertToMono::ForceMono);
/// ```
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// How to handle mono conversion during audio loading.
    pub convert_to_mono: ConvertToMono,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            convert_to_mono: ConvertToMono::Original,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }
}
