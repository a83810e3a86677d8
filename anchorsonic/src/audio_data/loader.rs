use crate::audio_data::{AnchorSonicAudioData, LoadOptions};
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;

/// Trait for loading audio data from file paths.
///
/// The asset registry decodes bundled resources through this trait. AnchorSonic ships
/// a Symphonia-backed [`DefaultAudioLoader`](crate::audio_data::DefaultAudioLoader);
/// bring your own for formats or containers Symphonia does not cover.
///
/// # Example
///
/// ```ignore
/// use anchorsonic::audio_data::{AudioDataLoader, LoadOptions, AnchorSonicAudioData};
/// use anchorsonic::error::Result;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// struct MyCustomLoader;
///
/// impl AudioDataLoader for MyCustomLoader {
///     fn load(&self, path: &Path, options: &LoadOptions) -> Result<Arc<AnchorSonicAudioData>> {
///         todo!()
///     }
/// }
/// ```
pub trait AudioDataLoader {
    /// Loads and decodes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorSonicError::Io`](crate::error::AnchorSonicError::Io) when the file
    /// cannot be opened and `AudioLoading` when it cannot be decoded.
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Arc<AnchorSonicAudioData>>;
}
