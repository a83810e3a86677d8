// Spatial audio module
//
// Direct-path spatializers (built-in panning, optionally Steam Audio) and the
// late-reverb room model shared by every spatial pipeline.

mod panning;
mod reverb;

#[cfg(feature = "steam-audio")]
mod hrtf;
#[cfg(feature = "steam-audio")]
mod steam;

pub use panning::PanningSpatializer;
pub use reverb::{Reverb, ReverbPreset};
#[cfg(feature = "steam-audio")]
pub use steam::SteamAudioSpatializer;

use crate::config::EngineDesc;
use crate::error::Result;
use crate::math::Vec3;

/// Renders a mono signal so it appears to arrive from a direction.
///
/// One spatializer instance serves one voice, so implementations may keep per-voice
/// state (delay lines, filter memory) between blocks.
pub trait Spatializer: Send {
    /// Spatializes `input` and adds it to the interleaved stereo `output`.
    ///
    /// `direction` is a unit vector in listener-local coordinates: +X right, +Y up,
    /// -Z ahead. `output` holds `2 * input.len()` samples.
    fn process(&mut self, input: &[f32], direction: Vec3, output: &mut [f32]) -> Result<()>;

    /// Clears internal state, e.g. after the voice restarts from frame zero.
    fn reset(&mut self);
}

/// Which spatializer the engine builds for each voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatializerKind {
    /// Interaural time and level differences; no external data required
    #[default]
    Panning,
    /// Steam Audio HRTF rendering through second-order ambisonics
    #[cfg(feature = "steam-audio")]
    SteamAudio,
}

pub(crate) fn create_spatializer(desc: &EngineDesc) -> Result<Box<dyn Spatializer>> {
    match desc.spatializer {
        SpatializerKind::Panning => Ok(Box::new(PanningSpatializer::new(desc.sample_rate))),
        #[cfg(feature = "steam-audio")]
        SpatializerKind::SteamAudio => Ok(Box::new(SteamAudioSpatializer::new(
            desc.sample_rate,
            desc.block_size,
            desc.hrtf_path.as_deref(),
        )?)),
    }
}
