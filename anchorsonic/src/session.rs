//! A complete head-tracked spatializer: one looping source anchored in the world, one
//! tracked listener.
//!
//! [`SpatializerSession::new`] builds everything in a fixed order:
//!
//! 1. register the sound asset and the sound event asset
//! 2. attach the listener, then the source (with its shape) to the scene root
//! 3. bind both to the mixer and create the sound event
//! 4. start the engine, then the sound event
//! 5. start head tracking
//!
//! [`SpatializerSession::shutdown`] undoes it in reverse: tracking, sound event, engine,
//! asset registrations, scene. It is idempotent and also runs on drop, including when
//! construction fails part way.

use crate::audio_data::{AnchorSonicAudioData, NormalizationMode};
use crate::config::{
    Calibration, CullOption, DistanceModel, EngineDesc, PlaybackMode, SamplerNodeDefinition,
    SpatialMixerDefinition, SpatialPipeline, SpatialPipelineFlags,
};
use crate::engine::AnchorSonicEngine;
use crate::error::Result;
use crate::events::AnchorSonicEvent;
use crate::math::{Mat4, Quat, Vec3};
use crate::motion::{HeadMotionSensor, MotionTracker, TrackingConfig, TrackingStatus};
use crate::registry::ChannelLayout;
use crate::scene::{Listener, Mesh, Shape, Source};
use crate::sound_event::{MixerParameters, SoundEvent};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the session's sound asset comes from.
#[derive(Debug, Clone)]
pub enum AssetSource {
    Path(PathBuf),
    Data(Arc<AnchorSonicAudioData>),
}

/// Everything a session is built from.
#[derive(Debug, Clone)]
pub struct SessionDesc {
    pub engine: EngineDesc,
    pub asset: AssetSource,
    pub asset_identifier: String,
    pub event_identifier: String,
    pub channel_layout: ChannelLayout,
    pub normalization: NormalizationMode,
    pub mixer: SpatialMixerDefinition,
    pub playback_mode: PlaybackMode,
    pub calibration: Calibration,
    pub cull_option: CullOption,
    /// Radius of the icosahedron attached to the source, in meters
    pub shape_radius: f32,
    pub source_transform: Mat4,
    pub tracking: TrackingConfig,
}

impl Default for SessionDesc {
    fn default() -> Self {
        Self {
            engine: EngineDesc::default(),
            asset: AssetSource::Path(PathBuf::from("ping.wav")),
            asset_identifier: "ping".into(),
            event_identifier: "pingevent".into(),
            channel_layout: ChannelLayout::Stereo,
            normalization: NormalizationMode::Dynamic,
            mixer: SpatialMixerDefinition::new(
                SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH_AND_LATE_REVERB)
                    .late_reverb_send_level(0.1),
            )
            .with_distance_model(DistanceModel::geometric_spreading(1.0).cull_distance(10.0)),
            playback_mode: PlaybackMode::Looping,
            calibration: Calibration::relative_spl(12.0),
            cull_option: CullOption::SleepWakeAtRealtimeOffset,
            shape_radius: 0.0142,
            source_transform: Mat4::from_rotation_translation(
                Quat::from_rotation_y(std::f32::consts::PI),
                Vec3::new(0.0, 0.0, 2.0),
            ),
            tracking: TrackingConfig::default(),
        }
    }
}

impl SessionDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(mut self, engine: EngineDesc) -> Self {
        self.engine = engine;
        self
    }

    pub fn asset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.asset = AssetSource::Path(path.into());
        self
    }

    pub fn asset_data(mut self, data: Arc<AnchorSonicAudioData>) -> Self {
        self.asset = AssetSource::Data(data);
        self
    }

    pub fn source_transform(mut self, transform: Mat4) -> Self {
        self.source_transform = transform;
        self
    }

    pub fn tracking(mut self, tracking: TrackingConfig) -> Self {
        self.tracking = tracking;
        self
    }
}

/// Owns the engine, scene, sound event and head tracker of one spatialized source.
pub struct SpatializerSession {
    engine: AnchorSonicEngine,
    listener: Listener,
    source: Source,
    mixer_identifier: String,
    sound_event: Option<SoundEvent>,
    tracker: Option<MotionTracker>,
    registered: Vec<String>,
    shut_down: bool,
}

impl SpatializerSession {
    /// Builds and starts the session.
    ///
    /// # Errors
    ///
    /// Any failing step aborts construction; whatever was already built is torn down
    /// before the error is returned. A missing asset file is
    /// [`AssetError::NotFound`](crate::error::AssetError::NotFound).
    pub fn new(desc: SessionDesc, sensor: impl HeadMotionSensor) -> Result<Self> {
        let engine = AnchorSonicEngine::new(desc.engine.clone())?;
        let listener = Listener::new(&engine);
        let shape = Shape::new(&engine, Mesh::icosahedron(desc.shape_radius, false));
        let source = Source::new(&engine, vec![shape])?;

        let mut session = Self {
            engine,
            listener,
            source,
            mixer_identifier: desc.mixer.identifier().to_string(),
            sound_event: None,
            tracker: None,
            registered: Vec::new(),
            shut_down: false,
        };
        session.build(&desc, sensor)?;

        log::info!(
            "Spatializer session ready ('{}' via '{}', tracking {:?})",
            desc.asset_identifier,
            desc.event_identifier,
            session.tracking_status()
        );
        Ok(session)
    }

    fn build(&mut self, desc: &SessionDesc, sensor: impl HeadMotionSensor) -> Result<()> {
        match &desc.asset {
            AssetSource::Path(path) => self.engine.register_sound_asset(
                path,
                &desc.asset_identifier,
                desc.channel_layout,
                desc.normalization,
            )?,
            AssetSource::Data(data) => self.engine.register_sound_asset_data(
                data.clone(),
                &desc.asset_identifier,
                desc.channel_layout,
                desc.normalization,
            )?,
        };
        self.registered.push(desc.asset_identifier.clone());

        let sampler = SamplerNodeDefinition::new(&desc.asset_identifier, desc.mixer.clone())
            .playback_mode(desc.playback_mode)
            .calibration(desc.calibration)
            .cull_option(desc.cull_option);
        self.engine
            .register_sound_event_asset(sampler.into(), &desc.event_identifier)?;
        self.registered.push(desc.event_identifier.clone());

        self.engine.root().add_child(&self.listener)?;
        self.source.set_transform(desc.source_transform)?;
        self.engine.root().add_child(&self.source)?;

        let mut params = MixerParameters::new();
        params.add_spatial_mixer_parameters(&self.mixer_identifier, &self.source, &self.listener);
        let event = self
            .sound_event
            .insert(SoundEvent::new(&self.engine, &desc.event_identifier, &params)?);

        self.engine.start()?;
        event.start()?;

        self.tracker = Some(MotionTracker::start(sensor, &self.listener, desc.tracking)?);
        Ok(())
    }

    pub fn engine(&self) -> &AnchorSonicEngine {
        &self.engine
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn sound_event(&self) -> Option<&SoundEvent> {
        self.sound_event.as_ref()
    }

    pub fn tracker(&self) -> Option<&MotionTracker> {
        self.tracker.as_ref()
    }

    pub fn tracking_status(&self) -> TrackingStatus {
        self.tracker
            .as_ref()
            .map_or(TrackingStatus::Static, MotionTracker::status)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Applies sensor events queued for the caller. See [`MotionTracker::pump`].
    pub fn pump(&self) -> usize {
        self.tracker.as_ref().map_or(0, MotionTracker::pump)
    }

    /// Renders offline blocks. See [`AnchorSonicEngine::render_offline`].
    pub fn render_offline(&self, output: &mut [f32]) -> Result<usize> {
        self.engine.render_offline(output)
    }

    pub fn poll_events(&self) -> Vec<AnchorSonicEvent> {
        self.engine.poll_events()
    }

    /// Tears everything down in reverse construction order. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Some(mut tracker) = self.tracker.take() {
            tracker.shutdown();
        }
        if let Some(mut event) = self.sound_event.take() {
            event.stop_and_invalidate();
        }
        if let Err(e) = self.engine.stop() {
            log::error!("Failed to stop engine during shutdown: {}", e);
        }
        while let Some(identifier) = self.registered.pop() {
            match self.engine.unregister_asset(&identifier) {
                Ok(_) => log::debug!("Unregistered asset '{}'", identifier),
                Err(e) => log::error!("Failed to unregister asset '{}': {}", identifier, e),
            }
        }
        self.engine.teardown_scene();
        log::info!("Spatializer session shut down");
    }
}

impl Drop for SpatializerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnchorSonicError, AssetError};
    use crate::motion::{DeliveryQueue, ManualSensor};
    use crate::sound_event::SoundEventState;

    fn ping() -> Arc<AnchorSonicAudioData> {
        let samples = (0..48000 * 2)
            .flat_map(|i| {
                let s = (i as f32 * 0.05).sin() * 0.5;
                [s, s]
            })
            .collect();
        AnchorSonicAudioData::from_samples(samples, 48000, 2).unwrap()
    }

    fn desc() -> SessionDesc {
        SessionDesc::default()
            .engine(EngineDesc::default().block_size(256))
            .asset_data(ping())
            .tracking(TrackingConfig::default().delivery(DeliveryQueue::Caller))
    }

    #[test]
    fn builds_in_order_and_shuts_down_once() {
        let mut session = SpatializerSession::new(desc(), ManualSensor::unavailable()).unwrap();
        assert!(session.engine().is_running());
        assert!(session.engine().has_asset("ping"));
        assert!(session.engine().has_asset("pingevent"));
        assert_eq!(
            session.sound_event().map(SoundEvent::state),
            Some(SoundEventState::Started)
        );
        assert_eq!(session.tracking_status(), TrackingStatus::Static);
        assert_eq!(session.engine().root().children().len(), 2);

        session.shutdown();
        assert!(session.is_shut_down());
        assert!(!session.engine().is_running());
        assert!(!session.engine().has_asset("ping"));
        assert!(!session.engine().has_asset("pingevent"));
        assert!(session.engine().root().children().is_empty());
        assert!(session.sound_event().is_none());

        session.shutdown();
    }

    #[test]
    fn missing_asset_fails_construction() {
        let desc = desc().asset_path("/definitely/not/here/ping.wav");
        let result = SpatializerSession::new(desc, ManualSensor::unavailable());
        assert!(matches!(
            result,
            Err(AnchorSonicError::Asset(AssetError::NotFound(_)))
        ));
    }

    #[test]
    fn renders_while_running() {
        let (sensor, _feed) = ManualSensor::new();
        let session = SpatializerSession::new(
            desc().source_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0))),
            sensor,
        )
        .unwrap();
        assert_eq!(session.tracking_status(), TrackingStatus::Tracking);

        let mut buffer = vec![0.0; 256 * 2 * 4];
        assert_eq!(session.render_offline(&mut buffer).unwrap(), 1024);
        assert!(buffer[512..].iter().any(|s| s.abs() > 1e-4));
    }

    #[test]
    fn default_session_stays_below_full_scale() {
        let desc = SessionDesc::default()
            .asset_data(ping())
            .tracking(TrackingConfig::default().delivery(DeliveryQueue::Caller));
        let session = SpatializerSession::new(desc, ManualSensor::unavailable()).unwrap();

        let mut block = vec![0.0; session.engine().config().block_len()];
        let mut peak = 0.0f32;
        for _ in 0..40 {
            session.render_offline(&mut block).unwrap();
            peak = block.iter().fold(peak, |peak, s| peak.max(s.abs()));
        }
        assert!(peak > 0.1);
        assert!(peak < 1.0, "peak {peak} reached full scale");
    }

    #[test]
    fn source_shape_faces_outward() {
        let session = SpatializerSession::new(desc(), ManualSensor::unavailable()).unwrap();
        let mesh = session.source().shapes()[0].mesh();
        for face in 0..mesh.triangles().len() {
            let [a, b, c] = mesh.triangles()[face];
            let centroid = (mesh.vertices()[a as usize]
                + mesh.vertices()[b as usize]
                + mesh.vertices()[c as usize])
                / 3.0;
            assert!(mesh.face_normal(face).unwrap().dot(centroid) > 0.0);
        }
    }
}
