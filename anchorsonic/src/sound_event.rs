//! Sound events: live instances of registered sound event assets.
//!
//! ```text
//! Constructed ──start()──▶ Started
//!      │                      │
//!      └──stop_and_invalidate()──▶ Invalidated (terminal)
//! ```
//!
//! A sound event leases its asset identifiers from the registry from construction
//! until invalidation, and counts as live for [`AnchorSonicEngine::stop`].

use crate::config::SoundEventNode;
use crate::engine::{AnchorSonicEngine, EngineShared};
use crate::error::SoundEventError;
use crate::playback::{RenderCommand, Voice, VoiceSpec};
use crate::registry::RegisteredAsset;
use crate::scene::{Listener, Node, Source};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEventState {
    Constructed,
    Started,
    Invalidated,
}

#[derive(Debug, Clone)]
struct SpatialBinding {
    source: Source,
    listener: Listener,
}

/// Binds concrete scene nodes to the mixers named in a sound event graph.
#[derive(Debug, Clone, Default)]
pub struct MixerParameters {
    bindings: HashMap<String, SpatialBinding>,
}

impl MixerParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders mixer `mixer_id` from `source` to `listener`. Rebinding replaces the pair.
    pub fn add_spatial_mixer_parameters(
        &mut self,
        mixer_id: &str,
        source: &Source,
        listener: &Listener,
    ) -> &mut Self {
        self.bindings.insert(
            mixer_id.to_string(),
            SpatialBinding {
                source: source.clone(),
                listener: listener.clone(),
            },
        );
        self
    }

    pub fn is_bound(&self, mixer_id: &str) -> bool {
        self.bindings.contains_key(mixer_id)
    }
}

/// A playable instance of a sound event asset.
pub struct SoundEvent {
    id: u64,
    asset_identifier: String,
    shared: Arc<EngineShared>,
    state: SoundEventState,
    voices: Vec<VoiceSpec>,
    leases: Vec<String>,
    completed: Arc<AtomicBool>,
}

impl SoundEvent {
    /// Resolves `asset_identifier` and binds its mixers to `mixer_parameters`.
    ///
    /// # Errors
    ///
    /// - [`SoundEventError::UnknownAsset`] if nothing is registered under the identifier
    /// - [`SoundEventError::NotASoundEvent`] if it names a sound asset
    /// - [`SoundEventError::MissingSoundAsset`] if a referenced sound asset was unregistered
    /// - [`SoundEventError::UnboundMixer`] if a mixer in the graph has no bound nodes
    /// - [`SoundEventError::ForeignNode`] / [`SoundEventError::NodeNotAttached`] if a bound
    ///   node belongs to another engine or is not attached to the root
    /// - [`SoundEventError::CapacityExceeded`] if the engine is at `max_sound_events`
    pub fn new(
        engine: &AnchorSonicEngine,
        asset_identifier: &str,
        mixer_parameters: &MixerParameters,
    ) -> Result<Self, SoundEventError> {
        let shared = engine.shared().clone();
        let max = shared.desc.max_sound_events;
        // The slot is reserved up front so concurrent constructors cannot overshoot `max`.
        if shared
            .live_events
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max).then_some(live + 1)
            })
            .is_err()
        {
            return Err(SoundEventError::CapacityExceeded(max));
        }

        let (voices, leases) = match resolve(&shared, asset_identifier, mixer_parameters) {
            Ok(resolved) => resolved,
            Err(e) => {
                shared.live_events.fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            }
        };

        let id = shared.next_event_id();
        log::debug!(
            "Created sound event {} from '{}' ({} voice(s))",
            id,
            asset_identifier,
            voices.len()
        );

        Ok(Self {
            id,
            asset_identifier: asset_identifier.to_string(),
            shared,
            state: SoundEventState::Constructed,
            voices,
            leases,
            completed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn asset_identifier(&self) -> &str {
        &self.asset_identifier
    }

    pub fn state(&self) -> SoundEventState {
        self.state
    }

    /// True once every one-shot voice has played out. Looping events never complete.
    pub fn has_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Begins rendering.
    ///
    /// # Errors
    ///
    /// - [`SoundEventError::InvalidTransition`] unless the event is `Constructed`
    /// - [`SoundEventError::EngineNotRunning`] if the engine has not been started; the
    ///   event stays `Constructed`
    pub fn start(&mut self) -> Result<(), SoundEventError> {
        if self.state != SoundEventState::Constructed {
            return Err(SoundEventError::InvalidTransition {
                operation: "start",
                state: self.state,
            });
        }
        if !self.shared.is_running() {
            return Err(SoundEventError::EngineNotRunning);
        }

        let voices = self
            .voices
            .iter()
            .cloned()
            .map(|spec| Voice::new(spec, &self.shared.desc))
            .collect::<crate::error::Result<Vec<_>>>()
            .map_err(|e| SoundEventError::Spatialization(e.to_string()))?;

        self.shared.send(RenderCommand::Start {
            event_id: self.id,
            voices,
            completed: self.completed.clone(),
        })?;
        self.state = SoundEventState::Started;
        log::info!("Sound event {} ('{}') started", self.id, self.asset_identifier);
        Ok(())
    }

    /// Stops rendering and releases the event's engine resources.
    ///
    /// Ends in `Invalidated` from any state; calling it again does nothing.
    pub fn stop_and_invalidate(&mut self) {
        match self.state {
            SoundEventState::Invalidated => return,
            SoundEventState::Started => {
                if let Err(e) = self.shared.send(RenderCommand::Stop { event_id: self.id }) {
                    log::warn!("Sound event {} stop not delivered: {}", self.id, e);
                }
            }
            SoundEventState::Constructed => {}
        }

        self.shared.registry().release(&self.leases);
        self.shared.live_events.fetch_sub(1, Ordering::AcqRel);
        self.voices.clear();
        self.state = SoundEventState::Invalidated;
        log::info!("Sound event {} invalidated", self.id);
    }
}

impl Drop for SoundEvent {
    fn drop(&mut self) {
        self.stop_and_invalidate();
    }
}

impl std::fmt::Debug for SoundEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundEvent")
            .field("id", &self.id)
            .field("asset_identifier", &self.asset_identifier)
            .field("state", &self.state)
            .finish()
    }
}

/// Builds the voices of `asset_identifier` and leases every asset they play.
fn resolve(
    shared: &EngineShared,
    asset_identifier: &str,
    mixer_parameters: &MixerParameters,
) -> Result<(Vec<VoiceSpec>, Vec<String>), SoundEventError> {
    let mut registry = shared.registry();
    let graph: SoundEventNode = match registry.get(asset_identifier) {
        None => return Err(SoundEventError::UnknownAsset(asset_identifier.to_string())),
        Some(RegisteredAsset::Sound { .. }) => {
            return Err(SoundEventError::NotASoundEvent(asset_identifier.to_string()));
        }
        Some(RegisteredAsset::SoundEvent(graph)) => graph.clone(),
    };

    let mut voices = Vec::new();
    let mut leases = vec![asset_identifier.to_string()];
    for sampler in graph.samplers() {
        let audio = match registry.get(&sampler.asset_identifier) {
            Some(RegisteredAsset::Sound { data, .. }) => data.clone(),
            _ => {
                return Err(SoundEventError::MissingSoundAsset(
                    sampler.asset_identifier.clone(),
                ));
            }
        };

        let mixer_id = sampler.mixer.identifier();
        let binding = mixer_parameters
            .bindings
            .get(mixer_id)
            .ok_or_else(|| SoundEventError::UnboundMixer(mixer_id.to_string()))?;
        check_node(shared, &binding.source)?;
        check_node(shared, &binding.listener)?;

        voices.push(VoiceSpec {
            audio,
            playback_mode: sampler.playback_mode,
            gain: sampler.calibration.gain(shared.desc.reference_spl_db),
            cull_option: sampler.cull_option,
            pipeline: sampler.mixer.pipeline,
            distance_model: sampler.mixer.distance_model,
            min_distance: binding.source.min_distance(),
            source: (*binding.source).clone(),
            listener: (*binding.listener).clone(),
        });
        leases.push(sampler.asset_identifier.clone());
    }

    registry.acquire(&leases);
    Ok((voices, leases))
}

fn check_node(shared: &EngineShared, node: &Node) -> Result<(), SoundEventError> {
    if node.engine_id() != shared.id {
        return Err(SoundEventError::ForeignNode(node.id().raw()));
    }
    if !node.is_attached() {
        return Err(SoundEventError::NodeNotAttached(node.id().raw()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::{AnchorSonicAudioData, NormalizationMode};
    use crate::config::{
        EngineDesc, PlaybackMode, SamplerNodeDefinition, SpatialMixerDefinition, SpatialPipeline,
        SpatialPipelineFlags,
    };
    use crate::error::AssetError;
    use crate::registry::ChannelLayout;

    struct Fixture {
        engine: AnchorSonicEngine,
        source: Source,
        listener: Listener,
        mixer: SpatialMixerDefinition,
    }

    fn fixture() -> Fixture {
        let engine = AnchorSonicEngine::new(EngineDesc::default().block_size(256)).unwrap();
        let data = AnchorSonicAudioData::from_samples(vec![0.25; 9600], 48000, 1).unwrap();
        engine
            .register_sound_asset_data(data, "tone", ChannelLayout::Mono, NormalizationMode::None)
            .unwrap();
        let mixer =
            SpatialMixerDefinition::new(SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH));
        engine
            .register_sound_event_asset(
                SamplerNodeDefinition::new("tone", mixer.clone())
                    .playback_mode(PlaybackMode::Looping)
                    .into(),
                "toneevent",
            )
            .unwrap();

        let listener = Listener::new(&engine);
        let source = Source::new(&engine, Vec::new()).unwrap();
        engine.root().add_child(&listener).unwrap();
        engine.root().add_child(&source).unwrap();
        Fixture {
            engine,
            source,
            listener,
            mixer,
        }
    }

    fn params(f: &Fixture) -> MixerParameters {
        let mut params = MixerParameters::new();
        params.add_spatial_mixer_parameters(f.mixer.identifier(), &f.source, &f.listener);
        params
    }

    #[test]
    fn walks_the_state_machine() {
        let f = fixture();
        let mut event = SoundEvent::new(&f.engine, "toneevent", &params(&f)).unwrap();
        assert_eq!(event.state(), SoundEventState::Constructed);

        assert_eq!(event.start(), Err(SoundEventError::EngineNotRunning));
        assert_eq!(event.state(), SoundEventState::Constructed);

        f.engine.start().unwrap();
        event.start().unwrap();
        assert_eq!(event.state(), SoundEventState::Started);
        assert_eq!(
            event.start(),
            Err(SoundEventError::InvalidTransition {
                operation: "start",
                state: SoundEventState::Started,
            })
        );

        event.stop_and_invalidate();
        assert_eq!(event.state(), SoundEventState::Invalidated);
        event.stop_and_invalidate();
        assert_eq!(event.state(), SoundEventState::Invalidated);
        assert!(matches!(
            event.start(),
            Err(SoundEventError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn invalidate_from_constructed() {
        let f = fixture();
        let mut event = SoundEvent::new(&f.engine, "toneevent", &params(&f)).unwrap();
        assert_eq!(f.engine.live_sound_events(), 1);
        event.stop_and_invalidate();
        assert_eq!(event.state(), SoundEventState::Invalidated);
        assert_eq!(f.engine.live_sound_events(), 0);
    }

    #[test]
    fn construction_errors() {
        let f = fixture();
        assert_eq!(
            SoundEvent::new(&f.engine, "nothing", &params(&f)).unwrap_err(),
            SoundEventError::UnknownAsset("nothing".into())
        );
        assert_eq!(
            SoundEvent::new(&f.engine, "tone", &params(&f)).unwrap_err(),
            SoundEventError::NotASoundEvent("tone".into())
        );
        assert_eq!(
            SoundEvent::new(&f.engine, "toneevent", &MixerParameters::new()).unwrap_err(),
            SoundEventError::UnboundMixer(f.mixer.identifier().to_string())
        );

        let loose = Listener::new(&f.engine);
        let mut unattached = MixerParameters::new();
        unattached.add_spatial_mixer_parameters(f.mixer.identifier(), &f.source, &loose);
        assert_eq!(
            SoundEvent::new(&f.engine, "toneevent", &unattached).unwrap_err(),
            SoundEventError::NodeNotAttached(loose.id().raw())
        );

        let other = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let foreign = Source::new(&other, Vec::new()).unwrap();
        other.root().add_child(&foreign).unwrap();
        let mut foreign_params = MixerParameters::new();
        foreign_params.add_spatial_mixer_parameters(f.mixer.identifier(), &foreign, &f.listener);
        assert_eq!(
            SoundEvent::new(&f.engine, "toneevent", &foreign_params).unwrap_err(),
            SoundEventError::ForeignNode(foreign.id().raw())
        );
        assert_eq!(f.engine.live_sound_events(), 0);
    }

    #[test]
    fn missing_sound_asset_is_reported() {
        let f = fixture();
        f.engine.unregister_asset("tone").unwrap();
        assert_eq!(
            SoundEvent::new(&f.engine, "toneevent", &params(&f)).unwrap_err(),
            SoundEventError::MissingSoundAsset("tone".into())
        );
    }

    #[test]
    fn live_events_lease_assets_and_block_engine_stop() {
        let f = fixture();
        f.engine.start().unwrap();
        let mut event = SoundEvent::new(&f.engine, "toneevent", &params(&f)).unwrap();
        event.start().unwrap();

        assert!(matches!(
            f.engine.unregister_asset("tone"),
            Err(AssetError::InUse { .. })
        ));
        assert!(f.engine.stop().is_err());

        drop(event);
        assert_eq!(f.engine.live_sound_events(), 0);
        f.engine.stop().unwrap();
        assert_eq!(f.engine.unregister_asset("toneevent"), Ok(true));
        assert_eq!(f.engine.unregister_asset("tone"), Ok(true));
    }

    #[test]
    fn capacity_is_enforced() {
        let engine = AnchorSonicEngine::new(EngineDesc {
            max_sound_events: 1,
            ..EngineDesc::default()
        })
        .unwrap();
        let data = AnchorSonicAudioData::from_samples(vec![0.1; 480], 48000, 1).unwrap();
        engine
            .register_sound_asset_data(data, "a", ChannelLayout::Mono, NormalizationMode::None)
            .unwrap();
        let mixer =
            SpatialMixerDefinition::new(SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH));
        engine
            .register_sound_event_asset(SamplerNodeDefinition::new("a", mixer.clone()).into(), "ev")
            .unwrap();
        let listener = Listener::new(&engine);
        let source = Source::new(&engine, Vec::new()).unwrap();
        engine.root().add_child(&listener).unwrap();
        engine.root().add_child(&source).unwrap();
        let mut params = MixerParameters::new();
        params.add_spatial_mixer_parameters(mixer.identifier(), &source, &listener);

        // Failed constructions give their slot back.
        for _ in 0..3 {
            assert!(matches!(
                SoundEvent::new(&engine, "nope", &params),
                Err(SoundEventError::UnknownAsset(_))
            ));
        }
        assert_eq!(engine.live_sound_events(), 0);

        let first = SoundEvent::new(&engine, "ev", &params).unwrap();
        assert_eq!(
            SoundEvent::new(&engine, "ev", &params).unwrap_err(),
            SoundEventError::CapacityExceeded(1)
        );
        assert_eq!(engine.live_sound_events(), 1);
        drop(first);
        assert_eq!(engine.live_sound_events(), 0);
        assert!(SoundEvent::new(&engine, "ev", &params).is_ok());
    }

    // A device-backed engine holds a cpal stream, which is not shareable across threads.
    #[cfg(not(feature = "device-output"))]
    #[test]
    fn concurrent_construction_respects_capacity() {
        let engine = AnchorSonicEngine::new(EngineDesc {
            max_sound_events: 3,
            ..EngineDesc::default()
        })
        .unwrap();
        let data = AnchorSonicAudioData::from_samples(vec![0.1; 480], 48000, 1).unwrap();
        engine
            .register_sound_asset_data(data, "a", ChannelLayout::Mono, NormalizationMode::None)
            .unwrap();
        let mixer =
            SpatialMixerDefinition::new(SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH));
        engine
            .register_sound_event_asset(SamplerNodeDefinition::new("a", mixer.clone()).into(), "ev")
            .unwrap();
        let listener = Listener::new(&engine);
        let source = Source::new(&engine, Vec::new()).unwrap();
        engine.root().add_child(&listener).unwrap();
        engine.root().add_child(&source).unwrap();
        let mut params = MixerParameters::new();
        params.add_spatial_mixer_parameters(mixer.identifier(), &source, &listener);

        let barrier = std::sync::Barrier::new(8);
        let created: Vec<SoundEvent> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        SoundEvent::new(&engine, "ev", &params).ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(created.len(), 3);
        assert_eq!(engine.live_sound_events(), 3);
    }
}
