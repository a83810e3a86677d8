use anchorsonic::config::EngineDesc;
use anchorsonic::math::{Orientation, azimuth_degrees, source_direction_in_listener};
use anchorsonic::motion::{DeliveryQueue, ManualSensor, TrackingConfig};
use anchorsonic::{AnchorSonicEvent, SessionDesc, SpatializerSession};
use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_ASSET: &str = "ping.wav";

const SAMPLE_RATE: u32 = 48000;
const SENSOR_RATE_HZ: u32 = 60;
const SWEEP_SECONDS: u32 = 5;

/// Writes a 2-second stereo ping: four decaying 1 kHz blips.
pub fn generate_ping(path: &str) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {path}"))?;

    let period = SAMPLE_RATE as usize / 2;
    for i in 0..SAMPLE_RATE as usize * 2 {
        let t = (i % period) as f32 / SAMPLE_RATE as f32;
        let sample = (2.0 * std::f32::consts::PI * 1000.0 * t).sin() * (-t * 18.0).exp() * 0.8;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    log::info!("Wrote 2 s stereo ping to {}", path);
    Ok(())
}

/// Renders a full 360° head turn at 60 Hz into a WAV file.
pub fn render_offline(asset: &str, output: &str) -> Result<()> {
    let frames_per_sample = (SAMPLE_RATE / SENSOR_RATE_HZ) as usize;
    let desc = SessionDesc::default()
        .engine(EngineDesc::default().block_size(frames_per_sample))
        .asset_path(asset)
        .tracking(TrackingConfig::default().delivery(DeliveryQueue::Caller));

    let (sensor, feed) = ManualSensor::new();
    let mut session = SpatializerSession::new(desc, sensor)
        .with_context(|| format!("building session from {asset} (try --generate-ping)"))?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("creating {output}"))?;

    let mut block = vec![0.0f32; session.engine().config().block_len()];
    let updates = SENSOR_RATE_HZ * SWEEP_SECONDS;
    let degrees_per_update = 360.0 / updates as f32;

    for i in 0..updates {
        let yaw = (i as f32 * degrees_per_update).to_radians();
        let timestamp = Duration::from_secs_f32(i as f32 / SENSOR_RATE_HZ as f32);
        feed.push_attitude(Orientation::from_yaw(yaw)?, timestamp);
        session.pump();
        session.render_offline(&mut block)?;
        for sample in &block {
            writer.write_sample(*sample)?;
        }

        if i % SENSOR_RATE_HZ == 0 {
            let listener = session.listener().transform();
            let source = session.source().transform();
            if let Some((direction, distance)) = source_direction_in_listener(&listener, &source) {
                log::info!(
                    "t={:.1}s source at {:+.0}° ({:.2} m)",
                    timestamp.as_secs_f32(),
                    azimuth_degrees(direction),
                    distance
                );
            }
        }
    }
    writer.finalize()?;
    log_events(&session);

    if let Some(tracker) = session.tracker() {
        let stats = tracker.stats();
        log::info!("{} head updates applied, {} dropped", stats.applied, stats.dropped);
    }
    session.shutdown();
    log::info!("Rendered {} s to {}", SWEEP_SECONDS, output);
    Ok(())
}

#[cfg(feature = "device-output")]
pub fn play_on_device(asset: &str) -> Result<()> {
    use anchorsonic::config::OutputMode;
    use anchorsonic::motion::ScriptedSensor;

    let desc = SessionDesc::default()
        .engine(EngineDesc::default().output(OutputMode::Device))
        .asset_path(asset);
    let sensor = ScriptedSensor::yaw_sweep(
        SENSOR_RATE_HZ as f32,
        Duration::from_secs(SWEEP_SECONDS as u64 * 2),
        36.0,
    );

    let mut session = SpatializerSession::new(desc, sensor)
        .with_context(|| format!("building session from {asset} (try --generate-ping)"))?;
    log::info!("Playing for {} s with a scripted head turn...", SWEEP_SECONDS * 2);

    for _ in 0..SWEEP_SECONDS * 2 {
        std::thread::sleep(Duration::from_secs(1));
        log_events(&session);
    }

    session.shutdown();
    Ok(())
}

#[cfg(not(feature = "device-output"))]
pub fn play_on_device(_asset: &str) -> Result<()> {
    anyhow::bail!("device playback needs --features device-output; try --offline <out.wav>")
}

fn log_events(session: &SpatializerSession) {
    for event in session.poll_events() {
        match event {
            AnchorSonicEvent::BufferUnderrun { missing_frames } => {
                log::warn!("Buffer underrun: {} frame(s) of silence", missing_frames);
            }
            AnchorSonicEvent::EngineError { error } => log::error!("Engine error: {}", error),
            other => log::debug!("{:?}", other),
        }
    }
}
