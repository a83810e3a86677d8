//! # AnchorSonic
//!
//! Head-tracked spatial audio for Rust: a sound source stays anchored at a fixed point in
//! the world while the listener turns their head.
//!
//! The main thread registers assets, builds a small scene (one listener, sources with
//! shapes) and drives sound events through their lifecycle. A head-orientation sensor
//! feeds the listener's transform; the renderer reads transforms each block and
//! spatializes every started sound event.
//!
//! ## Quick Start
//!
//! ```no_run
//! use anchorsonic::*;
//! use anchorsonic::motion::ManualSensor;
//!
//! // One call builds the whole pipeline: assets, scene, sound event, engine, tracking
//! let desc = SessionDesc::default().asset_path("ping.wav");
//! let (sensor, feed) = ManualSensor::new();
//! let mut session = SpatializerSession::new(desc, sensor)?;
//!
//! // Push head attitude as the sensor reports it
//! feed.push_attitude(math::Orientation::from_yaw(0.3)?, std::time::Duration::ZERO);
//!
//! // Render offline (the default output mode)
//! let mut block = vec![0.0f32; session.engine().config().block_len()];
//! session.render_offline(&mut block)?;
//!
//! for event in session.poll_events() {
//!     if let AnchorSonicEvent::EngineError { error } = event {
//!         eprintln!("render error: {error}");
//!     }
//! }
//!
//! session.shutdown();
//! # Ok::<(), AnchorSonicError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`AnchorSonicEngine`]**: asset registry, scene root and block renderer
//! - **[`registry`]**: sound assets and sound event assets, leased by live sound events
//! - **[`scene`]**: [`Listener`](scene::Listener), [`Source`](scene::Source) and
//!   [`Shape`](scene::Shape) nodes parented to the engine root
//! - **[`SoundEvent`]**: the `Constructed -> Started -> Invalidated` playback state machine
//! - **[`motion`]**: head-orientation sensors and the [`MotionTracker`](motion::MotionTracker)
//! - **[`math`]**: the `mirror * rotation * reference` listener transform
//! - **[`SpatializerSession`]**: everything above wired together, with ordered teardown
//!
//! ## Architecture
//!
//! 1. **Main Thread**: owns the engine, registers assets, creates and starts sound events
//! 2. **Sensor Thread**: delivers attitude samples; the tracker writes the listener transform
//! 3. **Render Thread** (offline: the caller): applies commands, reads transforms, renders
//!    blocks
//! 4. **Audio Callback** (`device-output`): lock-free consumption from a ring buffer
//!
//! The listener transform is the only state written from more than one context. It is
//! replaced whole under a mutex, and the renderer only ever `try_lock`s it.
//!
//! ## Features
//!
//! - `device-output`: play through the default device with `cpal`
//! - `steam-audio`: HRTF spatialization through Steam Audio
//! - `auto-install`: fetch the Steam Audio libraries at build time

pub mod audio_data;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
mod mixer;
pub mod motion;
mod playback;
pub mod registry;
pub mod scene;
pub mod session;
pub mod sound_event;
pub mod spatial;

pub use config::{EngineDesc, OutputMode};
pub use engine::AnchorSonicEngine;
pub use error::{AnchorSonicError, Result};
pub use events::AnchorSonicEvent;
pub use session::{AssetSource, SessionDesc, SpatializerSession};
pub use sound_event::{MixerParameters, SoundEvent, SoundEventState};
