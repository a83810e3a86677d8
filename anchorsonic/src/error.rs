//! Error types for AnchorSonic

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorSonicError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Spatialization error: {0}")]
    Spatialization(String),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    SoundEvent(#[from] SoundEventError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Sensor(#[from] SensorError),
}

/// Failures of the asset registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error("audio resource not found: {0}")]
    NotFound(PathBuf),

    #[error("audio resource {path} could not be decoded: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("channel layout {layout} is not supported: {reason}")]
    UnsupportedChannelLayout { layout: String, reason: String },

    #[error("asset identifier '{0}' is already registered")]
    DuplicateIdentifier(String),

    #[error("sound event graph '{identifier}' is malformed: {reason}")]
    MalformedGraph { identifier: String, reason: String },

    #[error("asset '{identifier}' is referenced by {active} live sound event(s)")]
    InUse { identifier: String, active: usize },

    #[error("asset identifier must not be empty")]
    EmptyIdentifier,
}

/// Failures of scene graph operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("node {0} is already attached to the root")]
    AlreadyAttached(u64),

    #[error("node {0} belongs to a different engine")]
    ForeignNode(u64),

    #[error("transform for node {0} contains non-finite values")]
    InvalidTransform(u64),

    #[error("mesh is invalid: {0}")]
    InvalidMesh(String),
}

/// Failures of sound event construction and lifecycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoundEventError {
    #[error("sound event asset '{0}' is not registered")]
    UnknownAsset(String),

    #[error("asset '{0}' is a sound asset, not a sound event asset")]
    NotASoundEvent(String),

    #[error("sound asset '{0}' referenced by the event is no longer registered")]
    MissingSoundAsset(String),

    #[error("no mixer parameters bound for mixer '{0}'")]
    UnboundMixer(String),

    #[error("node {0} bound in the mixer parameters is not attached to the engine root")]
    NodeNotAttached(u64),

    #[error("node {0} bound in the mixer parameters belongs to a different engine")]
    ForeignNode(u64),

    #[error("cannot {operation} a sound event in state {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: crate::sound_event::SoundEventState,
    },

    #[error("the engine must be running before a sound event is started")]
    EngineNotRunning,

    #[error("voice could not be prepared: {0}")]
    Spatialization(String),

    #[error("engine already holds the maximum of {0} live sound events")]
    CapacityExceeded(usize),

    #[error("render command could not be delivered: {0}")]
    Disconnected(String),
}

/// Rejections of malformed orientation input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("orientation contains non-finite components")]
    NonFinite,

    #[error("orientation is not a unit rotation (deviation {0})")]
    NotUnit(f32),

    #[error("rotation matrix is not orthonormal with determinant +1")]
    NotRotation,
}

/// Errors reported by a head-orientation sensor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("no head-orientation sensor is available")]
    Unavailable,

    #[error("the sensor is already delivering updates")]
    AlreadyActive,

    #[error("sensor sample failed: {0}")]
    Sample(String),

    #[error("sensor disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, AnchorSonicError>;
