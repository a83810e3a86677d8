//! Configuration descriptors.
//!
//! Everything here is plain data with `Default` impls and chainable setters; nothing is
//! persisted.

mod engine_desc;
mod mixer_definition;
mod sound_event_definition;

pub use engine_desc::{EngineDesc, OutputMode};
pub use mixer_definition::{
    DistanceModel, FadeOutParameters, SpatialMixerDefinition, SpatialPipeline,
    SpatialPipelineFlags,
};
pub use sound_event_definition::{
    Calibration, CalibrationMode, CullOption, PlaybackMode, SamplerNodeDefinition,
    SoundEventNode,
};
