//! Head tracking driving a rendered listener: a full yaw turn and sensor dropouts.

use anchorsonic::audio_data::{AnchorSonicAudioData, NormalizationMode};
use anchorsonic::config::{
    DistanceModel, EngineDesc, PlaybackMode, SamplerNodeDefinition, SpatialMixerDefinition,
    SpatialPipeline, SpatialPipelineFlags,
};
use anchorsonic::error::SensorError;
use anchorsonic::math::{
    Mat4, Orientation, Vec3, azimuth_degrees, compute_listener_transform, is_rigid_rotation,
    source_direction_in_listener,
};
use anchorsonic::motion::{
    DeliveryQueue, HeadMotionSensor, ManualSensor, MotionTracker, ScriptedSensor,
    TrackingConfig, TrackingStatus,
};
use anchorsonic::registry::ChannelLayout;
use anchorsonic::scene::{Listener, Source};
use anchorsonic::{AnchorSonicEngine, MixerParameters, SoundEvent};
use std::time::Duration;

const SAMPLE_RATE: u32 = 48000;
const SENSOR_RATE_HZ: f32 = 60.0;
const FRAMES_PER_UPDATE: usize = 800;

// Field order is drop order: the event is invalidated while its engine still exists.
struct Rig {
    event: SoundEvent,
    listener: Listener,
    source: Source,
    engine: AnchorSonicEngine,
}

/// Looping tone with the source two meters straight ahead.
fn rig() -> Rig {
    let _ = env_logger::builder().is_test(true).try_init();

    let engine =
        AnchorSonicEngine::new(EngineDesc::default().block_size(FRAMES_PER_UPDATE)).unwrap();
    let tone = (0..SAMPLE_RATE)
        .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 300.0 / SAMPLE_RATE as f32).sin() * 0.3)
        .collect();
    engine
        .register_sound_asset_data(
            AnchorSonicAudioData::from_samples(tone, SAMPLE_RATE, 1).unwrap(),
            "tone",
            ChannelLayout::Mono,
            NormalizationMode::None,
        )
        .unwrap();
    let mixer = SpatialMixerDefinition::new(SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH))
        .with_distance_model(DistanceModel::geometric_spreading(1.0).cull_distance(10.0));
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
    source
        .set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0)))
        .unwrap();
    engine.root().add_child(&listener).unwrap();
    engine.root().add_child(&source).unwrap();

    let mut params = MixerParameters::new();
    params.add_spatial_mixer_parameters(mixer.identifier(), &source, &listener);
    let mut event = SoundEvent::new(&engine, "toneevent", &params).unwrap();
    engine.start().unwrap();
    event.start().unwrap();

    Rig {
        event,
        listener,
        source,
        engine,
    }
}

fn azimuth(rig: &Rig) -> f32 {
    let (direction, distance) =
        source_direction_in_listener(&rig.listener.transform(), &rig.source.transform()).unwrap();
    assert!((distance - 2.0).abs() < 1e-4);
    azimuth_degrees(direction)
}

/// Signed difference folded into (-180, 180].
fn angle_step(from: f32, to: f32) -> f32 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

#[test]
fn full_yaw_turn_pans_smoothly_across_the_wrap() {
    let rig = rig();

    // The script reports yaw wrapped to (-180, 180] like a real attitude sensor
    let mut script = ScriptedSensor::yaw_sweep(SENSOR_RATE_HZ, Duration::from_secs(5), 72.0)
        .with_interval(Duration::ZERO);
    let (tx, rx) = crossbeam_channel::unbounded();
    let subscription = script.subscribe(tx).unwrap();
    let samples: Vec<_> = rx.iter().take(300).collect();
    subscription.cancel();
    assert_eq!(samples.len(), 300);

    let (sensor, feed) = ManualSensor::new();
    let tracker = MotionTracker::start(
        sensor,
        &rig.listener,
        TrackingConfig::default().delivery(DeliveryQueue::Caller),
    )
    .unwrap();
    assert_eq!(tracker.status(), TrackingStatus::Tracking);

    let mut block = vec![0.0f32; rig.engine.config().block_len()];
    let mut previous_transform: Option<Mat4> = None;
    let mut previous_azimuth: Option<f32> = None;
    let mut travelled = 0.0f32;

    for sample in samples {
        assert!(feed.push(sample));
        assert_eq!(tracker.pump(), 1);

        let transform = rig.listener.transform();
        assert!(is_rigid_rotation(&transform, 1e-4));

        let current = azimuth(&rig);
        match (previous_transform, previous_azimuth) {
            (Some(last), Some(last_azimuth)) => {
                let step = angle_step(last_azimuth, current);
                assert!(step.abs() < 2.0, "azimuth jumped {step}° ({last_azimuth} -> {current})");
                travelled += step;
                let delta = (transform - last).to_cols_array();
                assert!(delta.iter().all(|d| d.abs() < 0.05));
            }
            _ => assert!(current.abs() < 1e-3, "sweep starts with the source ahead"),
        }
        previous_transform = Some(transform);
        previous_azimuth = Some(current);

        rig.engine.render_offline(&mut block).unwrap();
        assert!(block.iter().any(|s| s.abs() > 1e-3));
    }

    assert!(travelled.abs() > 355.0 && travelled.abs() < 360.0);
    assert_eq!(tracker.stats().applied, 300);
    assert_eq!(tracker.stats().dropped, 0);
}

#[test]
fn sensor_error_holds_the_last_good_transform() {
    let rig = rig();
    let (sensor, feed) = ManualSensor::new();
    let tracker = MotionTracker::start(
        sensor,
        &rig.listener,
        TrackingConfig::default().delivery(DeliveryQueue::Caller),
    )
    .unwrap();

    let yaw = |degrees: f32| Orientation::from_yaw(degrees.to_radians()).unwrap();
    let mut block = vec![0.0f32; rig.engine.config().block_len()];

    feed.push_attitude(yaw(10.0), Duration::ZERO);
    feed.push_attitude(yaw(20.0), Duration::from_millis(16));
    tracker.pump();
    let after_second = rig.listener.transform();
    assert_eq!(after_second, compute_listener_transform(&yaw(20.0), Mat4::IDENTITY));

    feed.push(Err(SensorError::Sample("attitude unavailable".into())));
    tracker.pump();
    assert_eq!(rig.listener.transform(), after_second);
    rig.engine.render_offline(&mut block).unwrap();
    assert!(block.iter().any(|s| s.abs() > 1e-3));

    feed.push_attitude(yaw(40.0), Duration::from_millis(50));
    tracker.pump();
    assert_eq!(
        rig.listener.transform(),
        compute_listener_transform(&yaw(40.0), Mat4::IDENTITY)
    );
    assert_eq!(tracker.stats().applied, 3);
    assert_eq!(tracker.stats().dropped, 1);
}

#[test]
fn missing_sensor_keeps_rendering_from_the_reference_frame() {
    let rig = rig();
    let tracker =
        MotionTracker::start(ManualSensor::unavailable(), &rig.listener, TrackingConfig::default())
            .unwrap();
    assert_eq!(tracker.status(), TrackingStatus::Static);
    assert_eq!(rig.listener.transform(), Mat4::IDENTITY);
    assert!(azimuth(&rig).abs() < 1e-3);

    let mut block = vec![0.0f32; rig.engine.config().block_len()];
    rig.engine.render_offline(&mut block).unwrap();
    assert!(block.iter().any(|s| s.abs() > 1e-3));
    assert_eq!(rig.event.state(), anchorsonic::SoundEventState::Started);
}
