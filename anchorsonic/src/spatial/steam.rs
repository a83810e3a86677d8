use crate::error::{AnchorSonicError, Result};
use crate::math::Vec3;
use crate::spatial::{Spatializer, hrtf};
use audionimbus::{
    AmbisonicsDecodeEffect, AmbisonicsDecodeEffectParams, AmbisonicsDecodeEffectSettings,
    AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams, AmbisonicsEncodeEffectSettings,
    AudioBufferSettings, AudioSettings, Context, CoordinateSystem, Direction, Hrtf,
    SpeakerLayout, Vector3, audio_buffer::AudioBuffer as SteamAudioBuffer,
};

/// Second-order ambisonics: 9 channels.
const AMBISONICS_ORDER: u32 = 2;
const AMBISONICS_CHANNELS: usize = 9;

/// HRTF spatializer backed by Steam Audio.
///
/// The voice is encoded to ambisonics in the direction of the source and decoded
/// binaurally with the listener looking down -Z. Distance attenuation stays with the
/// engine's distance model, so no Steam Audio simulator is involved.
pub struct SteamAudioSpatializer {
    context: Context,
    hrtf: Hrtf,
    encode_effect: AmbisonicsEncodeEffect,
    decode_effect: AmbisonicsDecodeEffect,
    frame_size: usize,

    cached_input_buf: Vec<f32>,
    cached_encoded_buf: Vec<f32>,
    cached_decoded_buf: Vec<f32>,
    cached_binaural_buf: Vec<f32>,
}

impl SteamAudioSpatializer {
    pub fn new(sample_rate: u32, frame_size: usize, hrtf_path: Option<&str>) -> Result<Self> {
        let context = Context::try_new(&audionimbus::ContextSettings::default()).map_err(|e| {
            AnchorSonicError::Spatialization(format!("Failed to create Steam Audio context: {}", e))
        })?;

        let audio_settings = AudioSettings {
            sampling_rate: sample_rate,
            frame_size: frame_size as u32,
        };

        let hrtf = hrtf::load_hrtf(&context, &audio_settings, hrtf_path)?;

        let encode_effect = AmbisonicsEncodeEffect::try_new(
            &context,
            &audio_settings,
            &AmbisonicsEncodeEffectSettings {
                max_order: AMBISONICS_ORDER,
            },
        )
        .map_err(|e| {
            AnchorSonicError::Spatialization(format!("Failed to create AmbisonicsEncodeEffect: {}", e))
        })?;

        let decode_effect = AmbisonicsDecodeEffect::try_new(
            &context,
            &audio_settings,
            &AmbisonicsDecodeEffectSettings {
                max_order: AMBISONICS_ORDER,
                speaker_layout: SpeakerLayout::Stereo,
                hrtf: &hrtf,
            },
        )
        .map_err(|e| {
            AnchorSonicError::Spatialization(format!("Failed to create AmbisonicsDecodeEffect: {}", e))
        })?;

        log::debug!(
            "Created Steam Audio spatializer ({} Hz, {} frames)",
            sample_rate,
            frame_size
        );

        Ok(Self {
            context,
            hrtf,
            encode_effect,
            decode_effect,
            frame_size,
            cached_input_buf: vec![0.0; frame_size],
            cached_encoded_buf: vec![0.0; frame_size * AMBISONICS_CHANNELS],
            cached_decoded_buf: vec![0.0; frame_size * 2],
            cached_binaural_buf: vec![0.0; frame_size * 2],
        })
    }

    fn buffer_error(e: impl std::fmt::Display) -> AnchorSonicError {
        AnchorSonicError::Spatialization(format!("Failed to create audio buffer: {}", e))
    }
}

impl Spatializer for SteamAudioSpatializer {
    fn process(&mut self, input: &[f32], direction: Vec3, output: &mut [f32]) -> Result<()> {
        if input.len() != self.frame_size {
            return Err(AnchorSonicError::Spatialization(format!(
                "expected {} frames, got {}",
                self.frame_size,
                input.len()
            )));
        }
        self.cached_input_buf.copy_from_slice(input);

        let input_buf = SteamAudioBuffer::try_with_data_and_settings(
            &self.cached_input_buf,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(Self::buffer_error)?;
        let encoded_buf = SteamAudioBuffer::try_with_data_and_settings(
            &mut self.cached_encoded_buf,
            AudioBufferSettings {
                num_channels: Some(AMBISONICS_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(Self::buffer_error)?;

        self.encode_effect.apply(
            &AmbisonicsEncodeEffectParams {
                direction: Direction::new(direction.x, direction.y, direction.z),
                order: AMBISONICS_ORDER,
            },
            &input_buf,
            &encoded_buf,
        );

        let decoded_buf = SteamAudioBuffer::try_with_data_and_settings(
            &mut self.cached_decoded_buf,
            AudioBufferSettings {
                num_channels: Some(2),
                ..Default::default()
            },
        )
        .map_err(Self::buffer_error)?;

        self.decode_effect.apply(
            &AmbisonicsDecodeEffectParams {
                order: AMBISONICS_ORDER,
                hrtf: &self.hrtf,
                orientation: CoordinateSystem {
                    ahead: Vector3::new(0.0, 0.0, -1.0),
                    ..Default::default()
                },
                binaural: true,
            },
            &encoded_buf,
            &decoded_buf,
        );

        decoded_buf.interleave(&self.context, &mut self.cached_binaural_buf);

        for (out, sample) in output.iter_mut().zip(&self.cached_binaural_buf) {
            *out += sample;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.encode_effect.reset();
        self.decode_effect.reset();
    }
}
