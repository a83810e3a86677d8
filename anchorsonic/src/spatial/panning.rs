//! Lightweight binaural panner.
//!
//! Positions a mono voice with two cues:
//! - **ITD**: the far ear hears the signal later (Woodworth spherical-head model)
//! - **ILD**: the far ear is shadowed by the head and hears it quieter
//!
//! Sources behind the listener are slightly darker in level so front/back flips are
//! less ambiguous. Cue values are ramped across each block, so a listener turning
//! their head at sensor rate never produces zipper noise.

use crate::error::Result;
use crate::math::Vec3;
use crate::spatial::Spatializer;

/// Speed of sound in air (meters per second) at 20°C.
const SPEED_OF_SOUND: f32 = 343.0;

/// Average human head radius in meters.
const HEAD_RADIUS: f32 = 0.0875;

/// Level lost at the far ear for a fully lateral source.
const HEAD_SHADOW: f32 = 0.6;

/// Level lost for a source directly behind the listener.
const REAR_ATTENUATION: f32 = 0.2;

/// Largest ITD the model produces: lateral angle of 90°.
const MAX_ITD_SECONDS: f32 = HEAD_RADIUS / SPEED_OF_SOUND * (1.0 + std::f32::consts::FRAC_PI_2);

#[derive(Debug, Clone, Copy, PartialEq)]
struct EarCues {
    gain_left: f32,
    gain_right: f32,
    delay_left: f32,
    delay_right: f32,
}

impl EarCues {
    fn for_direction(direction: Vec3, sample_rate: u32) -> Self {
        let lateral = direction.x.clamp(-1.0, 1.0);
        let angle = lateral.abs().asin();
        let itd = HEAD_RADIUS / SPEED_OF_SOUND * (angle.sin() + angle) * sample_rate as f32;
        let rear = 1.0 - REAR_ATTENUATION * direction.z.clamp(0.0, 1.0);
        let far = (1.0 - HEAD_SHADOW * lateral.abs()) * rear;

        if lateral >= 0.0 {
            Self {
                gain_left: far,
                gain_right: rear,
                delay_left: itd,
                delay_right: 0.0,
            }
        } else {
            Self {
                gain_left: rear,
                gain_right: far,
                delay_left: 0.0,
                delay_right: itd,
            }
        }
    }

    fn lerp(&self, target: &Self, t: f32) -> Self {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        Self {
            gain_left: mix(self.gain_left, target.gain_left),
            gain_right: mix(self.gain_right, target.gain_right),
            delay_left: mix(self.delay_left, target.delay_left),
            delay_right: mix(self.delay_right, target.delay_right),
        }
    }
}

/// Ring buffer read at fractional delays with linear interpolation.
#[derive(Debug)]
struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    fn new(max_delay: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay + 2],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.buffer[self.write] = sample;
        self.write = (self.write + 1) % self.buffer.len();
    }

    /// Sample written `delay` samples before the newest one.
    fn read(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(0.0, (len - 2) as f32);
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let newest = (self.write + len - 1) % len;
        let a = self.buffer[(newest + len - whole) % len];
        let b = self.buffer[(newest + len - whole - 1) % len];
        a + (b - a) * frac
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

/// ITD/ILD spatializer used when no HRTF backend is configured.
#[derive(Debug)]
pub struct PanningSpatializer {
    sample_rate: u32,
    delay: DelayLine,
    cues: Option<EarCues>,
}

impl PanningSpatializer {
    pub fn new(sample_rate: u32) -> Self {
        let max_delay = (MAX_ITD_SECONDS * sample_rate as f32).ceil() as usize;
        Self {
            sample_rate,
            delay: DelayLine::new(max_delay),
            cues: None,
        }
    }

    /// Left and right gains the panner settles at for `direction`.
    pub fn steady_state_gains(&self, direction: Vec3) -> (f32, f32) {
        let cues = EarCues::for_direction(direction, self.sample_rate);
        (cues.gain_left, cues.gain_right)
    }
}

impl Spatializer for PanningSpatializer {
    fn process(&mut self, input: &[f32], direction: Vec3, output: &mut [f32]) -> Result<()> {
        let target = EarCues::for_direction(direction, self.sample_rate);
        let start = self.cues.unwrap_or(target);
        let frames = input.len().min(output.len() / 2);

        for (i, &sample) in input.iter().take(frames).enumerate() {
            let cues = start.lerp(&target, (i + 1) as f32 / frames as f32);
            self.delay.push(sample);
            output[i * 2] += self.delay.read(cues.delay_left) * cues.gain_left;
            output[i * 2 + 1] += self.delay.read(cues.delay_right) * cues.gain_right;
        }

        self.cues = Some(target);
        Ok(())
    }

    fn reset(&mut self) {
        self.delay.clear();
        self.cues = None;
    }
}
