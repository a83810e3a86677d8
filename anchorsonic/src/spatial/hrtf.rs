use crate::error::{AnchorSonicError, Result};
use audionimbus::{AudioSettings, Context, Hrtf, HrtfSettings, Sofa, VolumeNormalization};

/// Loads the HRTF used by the Steam Audio spatializer.
///
/// `sofa_path` selects a custom SOFA file; `None` uses Steam Audio's built-in HRTF.
pub(crate) fn load_hrtf(
    context: &Context,
    audio_settings: &AudioSettings,
    sofa_path: Option<&str>,
) -> Result<Hrtf> {
    let sofa_information = match sofa_path {
        Some(path) => Some(Sofa::Buffer(std::fs::read(path)?)),
        None => None,
    };

    let hrtf = Hrtf::try_new(
        context,
        audio_settings,
        &HrtfSettings {
            volume_normalization: VolumeNormalization::None,
            sofa_information,
            ..Default::default()
        },
    )
    .map_err(|e| AnchorSonicError::Spatialization(format!("Failed to create HRTF: {}", e)))?;

    match sofa_path {
        Some(path) => log::info!("Loaded HRTF from {}", path),
        None => log::info!("Loaded default HRTF"),
    }
    Ok(hrtf)
}
