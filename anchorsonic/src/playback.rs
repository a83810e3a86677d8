use crate::audio_data::AnchorSonicAudioData;
use crate::config::{CullOption, DistanceModel, EngineDesc, PlaybackMode, SpatialPipeline};
use crate::error::Result;
use crate::math::{Vec3, source_direction_in_listener};
use crate::scene::{Node, TransformReader};
use crate::spatial::{Reverb, Spatializer, create_spatializer};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Everything the renderer needs to play one sampler leaf, resolved on the main thread.
#[derive(Debug, Clone)]
pub(crate) struct VoiceSpec {
    pub audio: Arc<AnchorSonicAudioData>,
    pub playback_mode: PlaybackMode,
    /// Linear calibration gain
    pub gain: f32,
    pub cull_option: CullOption,
    pub pipeline: SpatialPipeline,
    pub distance_model: DistanceModel,
    pub min_distance: f32,
    pub source: Node,
    pub listener: Node,
}

/// Playback state of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VoiceState {
    Playing,
    /// Culled by distance; silent until the source is back in range
    Sleeping,
    Finished,
}

/// Things a voice reports back to the mixer during a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VoiceEvent {
    Looped(u32),
    Culled,
    Woke,
}

/// One sampler of a started sound event, owned by the render side.
pub(crate) struct Voice {
    audio: Arc<AnchorSonicAudioData>,
    playback_mode: PlaybackMode,
    gain: f32,
    cull_option: CullOption,
    pipeline: SpatialPipeline,
    distance_model: DistanceModel,
    min_distance: f32,
    source: TransformReader,
    listener: TransformReader,
    spatializer: Box<dyn Spatializer>,
    reverb: Option<Reverb>,
    cursor: usize,
    loop_count: u32,
    state: VoiceState,
}

impl Voice {
    /// Builds the voice and its per-voice DSP for `desc`.
    pub fn new(spec: VoiceSpec, desc: &EngineDesc) -> Result<Self> {
        let spatializer = create_spatializer(desc)?;
        let reverb = if spec.pipeline.flags.late_reverb {
            Reverb::new(desc.reverb_preset, desc.sample_rate)
        } else {
            None
        };
        let state = if spec.audio.total_frames() == 0 {
            VoiceState::Finished
        } else {
            VoiceState::Playing
        };

        Ok(Self {
            playback_mode: spec.playback_mode,
            gain: spec.gain,
            cull_option: spec.cull_option,
            pipeline: spec.pipeline,
            distance_model: spec.distance_model,
            min_distance: spec.min_distance,
            source: spec.source.reader(),
            listener: spec.listener.reader(),
            audio: spec.audio,
            spatializer,
            reverb,
            cursor: 0,
            loop_count: 0,
            state,
        })
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == VoiceState::Finished
    }

    /// Renders one block and adds it to the interleaved stereo `output`.
    ///
    /// `scratch` holds one mono block and sets the block length.
    pub fn render(
        &mut self,
        scratch: &mut [f32],
        output: &mut [f32],
        events: &mut Vec<VoiceEvent>,
    ) -> Result<()> {
        if self.state == VoiceState::Finished {
            return Ok(());
        }

        let listener = self.listener.read();
        let source = self.source.read();
        let (direction, distance) =
            source_direction_in_listener(&listener, &source).unwrap_or((Vec3::NEG_Z, 0.0));

        let culled =
            self.cull_option != CullOption::DoNotCull && self.distance_model.is_culled(distance);
        if culled {
            self.cull(scratch.len(), events);
            return Ok(());
        }
        if self.state == VoiceState::Sleeping {
            self.wake(events);
        }

        let gain = self.gain * self.distance_model.attenuation(distance, self.min_distance);
        for slot in scratch.iter_mut() {
            *slot = self.next_frame(events).map_or(0.0, |sample| sample * gain);
        }

        if self.pipeline.flags.direct_path_transmission {
            self.spatializer.process(scratch, direction, output)?;
        }
        if let Some(reverb) = self.reverb.as_mut() {
            reverb.process(scratch, self.pipeline.late_reverb_send_level, output);
        }
        Ok(())
    }

    fn cull(&mut self, frames: usize, events: &mut Vec<VoiceEvent>) {
        if self.state == VoiceState::Playing {
            events.push(VoiceEvent::Culled);
        }
        match self.cull_option {
            CullOption::Terminate => {
                log::debug!("Voice terminated by cull at frame {}", self.cursor);
                self.state = VoiceState::Finished;
            }
            CullOption::SleepWakeAtZero => self.state = VoiceState::Sleeping,
            CullOption::SleepWakeAtRealtimeOffset => {
                self.state = VoiceState::Sleeping;
                for _ in 0..frames {
                    if self.next_frame(events).is_none() {
                        break;
                    }
                }
            }
            CullOption::DoNotCull => {}
        }
    }

    fn wake(&mut self, events: &mut Vec<VoiceEvent>) {
        if self.cull_option == CullOption::SleepWakeAtZero {
            self.cursor = 0;
            self.spatializer.reset();
        }
        self.state = VoiceState::Playing;
        events.push(VoiceEvent::Woke);
    }

    /// Mono sample at the cursor, advancing it. `None` once a one-shot voice has ended.
    #[inline]
    fn next_frame(&mut self, events: &mut Vec<VoiceEvent>) -> Option<f32> {
        if self.state == VoiceState::Finished {
            return None;
        }
        if self.cursor >= self.audio.total_frames() {
            match self.playback_mode {
                PlaybackMode::Looping => {
                    self.cursor = 0;
                    self.loop_count += 1;
                    events.push(VoiceEvent::Looped(self.loop_count));
                }
                PlaybackMode::OneShot => {
                    self.state = VoiceState::Finished;
                    return None;
                }
            }
        }
        let sample = self.audio.mono_frame(self.cursor);
        self.cursor += 1;
        if self.playback_mode == PlaybackMode::OneShot && self.cursor >= self.audio.total_frames() {
            self.state = VoiceState::Finished;
        }
        Some(sample)
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("playback_mode", &self.playback_mode)
            .field("cursor", &self.cursor)
            .field("loop_count", &self.loop_count)
            .field("state", &self.state)
            .finish()
    }
}

/// Commands sent from the main thread to the renderer.
pub(crate) enum RenderCommand {
    /// Begin rendering a sound event
    Start {
        event_id: u64,
        voices: Vec<Voice>,
        completed: Arc<AtomicBool>,
    },
    /// Drop a sound event's voices immediately
    Stop { event_id: u64 },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{EngineDesc, SpatialPipelineFlags};
    use crate::math::Mat4;
    use crate::scene::{Listener, Source};
    use crate::engine::AnchorSonicEngine;

    pub(crate) fn ramp(frames: usize) -> Arc<AnchorSonicAudioData> {
        let samples = (0..frames).map(|i| 0.1 + i as f32 / frames as f32 * 0.5).collect();
        AnchorSonicAudioData::from_samples(samples, 48000, 1).unwrap()
    }

    fn spec(engine: &AnchorSonicEngine, frames: usize, mode: PlaybackMode) -> (VoiceSpec, Source) {
        let listener = Listener::new(engine);
        let source = Source::new(engine, Vec::new()).unwrap();
        source
            .set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0)))
            .unwrap();
        let spec = VoiceSpec {
            audio: ramp(frames),
            playback_mode: mode,
            gain: 1.0,
            cull_option: CullOption::SleepWakeAtRealtimeOffset,
            pipeline: SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH),
            distance_model: DistanceModel::geometric_spreading(1.0).cull_distance(10.0),
            min_distance: 0.01,
            source: (*source).clone(),
            listener: (*listener).clone(),
        };
        (spec, source)
    }

    fn render(voice: &mut Voice, frames: usize) -> (Vec<f32>, Vec<VoiceEvent>) {
        let mut scratch = vec![0.0; frames];
        let mut output = vec![0.0; frames * 2];
        let mut events = Vec::new();
        voice.render(&mut scratch, &mut output, &mut events).unwrap();
        (output, events)
    }

    #[test]
    fn one_shot_finishes_at_the_last_frame() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let (spec, _source) = spec(&engine, 100, PlaybackMode::OneShot);
        let mut voice = Voice::new(spec, &EngineDesc::default()).unwrap();
        let (output, _) = render(&mut voice, 64);
        assert!(output.iter().any(|s| *s != 0.0));
        assert_eq!(voice.state(), VoiceState::Playing);
        render(&mut voice, 64);
        assert!(voice.is_finished());
        let (output, _) = render(&mut voice, 64);
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn looping_wraps_and_reports() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let (spec, _source) = spec(&engine, 100, PlaybackMode::Looping);
        let mut voice = Voice::new(spec, &EngineDesc::default()).unwrap();
        let (_, events) = render(&mut voice, 256);
        assert_eq!(events, [VoiceEvent::Looped(1), VoiceEvent::Looped(2)]);
        assert!(!voice.is_finished());
    }

    #[test]
    fn culled_voice_sleeps_and_wakes() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let (spec, source) = spec(&engine, 1000, PlaybackMode::Looping);
        let mut voice = Voice::new(spec, &EngineDesc::default()).unwrap();

        source
            .set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -20.0)))
            .unwrap();
        let (output, events) = render(&mut voice, 64);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(events, [VoiceEvent::Culled]);
        assert_eq!(voice.state(), VoiceState::Sleeping);
        assert_eq!(voice.cursor, 64);

        source
            .set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0)))
            .unwrap();
        let (output, events) = render(&mut voice, 64);
        assert_eq!(events, [VoiceEvent::Woke]);
        assert!(output.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn terminate_cull_finishes_the_voice() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let (mut spec, source) = spec(&engine, 1000, PlaybackMode::Looping);
        spec.cull_option = CullOption::Terminate;
        let mut voice = Voice::new(spec, &EngineDesc::default()).unwrap();
        source
            .set_transform(Mat4::from_translation(Vec3::new(30.0, 0.0, 0.0)))
            .unwrap();
        render(&mut voice, 64);
        assert!(voice.is_finished());
    }

    #[test]
    fn wake_at_zero_rewinds() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let (mut spec, source) = spec(&engine, 1000, PlaybackMode::Looping);
        spec.cull_option = CullOption::SleepWakeAtZero;
        let mut voice = Voice::new(spec, &EngineDesc::default()).unwrap();
        render(&mut voice, 64);
        source
            .set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -20.0)))
            .unwrap();
        render(&mut voice, 64);
        assert_eq!(voice.cursor, 64);
        source.set_transform(Mat4::IDENTITY).unwrap();
        render(&mut voice, 64);
        assert_eq!(voice.cursor, 64);
    }
}
