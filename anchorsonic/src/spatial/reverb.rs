//! Late reverberation.
//!
//! A Schroeder/Moorer network per voice: a pre-delay, four damped feedback combs in
//! parallel and two allpass diffusers in series, run twice with slightly detuned
//! delay lengths to decorrelate left and right.

/// Comb delays in samples at 44.1 kHz.
const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356];
/// Allpass delays in samples at 44.1 kHz.
const ALLPASS_TUNING: [usize; 2] = [556, 441];
/// Extra delay applied to the right channel's lines.
const STEREO_SPREAD: usize = 23;
const ALLPASS_FEEDBACK: f32 = 0.5;
const TUNING_RATE: f32 = 44100.0;

/// Room model used for the late reverb send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverbPreset {
    /// Late reverb disabled
    None,
    SmallRoom,
    #[default]
    MediumRoom,
    LargeRoom,
    Cathedral,
}

impl ReverbPreset {
    /// RT60 decay time in seconds.
    pub const fn decay_seconds(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::SmallRoom => 0.4,
            Self::MediumRoom => 0.8,
            Self::LargeRoom => 1.6,
            Self::Cathedral => 3.5,
        }
    }

    /// High-frequency damping inside the feedback loop (0.0 - 1.0).
    pub const fn damping(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::SmallRoom => 0.45,
            Self::MediumRoom => 0.35,
            Self::LargeRoom => 0.3,
            Self::Cathedral => 0.2,
        }
    }

    /// Pre-delay before the first reflection in milliseconds.
    pub const fn predelay_ms(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::SmallRoom => 5.0,
            Self::MediumRoom => 10.0,
            Self::LargeRoom => 20.0,
            Self::Cathedral => 35.0,
        }
    }

    /// Output level of the wet signal.
    pub const fn wet_gain(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::SmallRoom => 0.5,
            Self::MediumRoom => 0.45,
            Self::LargeRoom => 0.4,
            Self::Cathedral => 0.35,
        }
    }
}

#[derive(Debug)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damping: f32,
    filter_store: f32,
}

impl Comb {
    fn new(length: usize, feedback: f32, damping: f32) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            index: 0,
            feedback,
            damping,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - self.damping) + self.filter_store * self.damping;
        self.buffer[self.index] = input + self.filter_store * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

#[derive(Debug)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.index];
        let output = delayed - input;
        self.buffer[self.index] = input + delayed * ALLPASS_FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

#[derive(Debug)]
struct Channel {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Channel {
    fn new(preset: ReverbPreset, sample_rate: u32, spread: usize) -> Self {
        let scale = sample_rate as f32 / TUNING_RATE;
        let decay = preset.decay_seconds();
        let combs = COMB_TUNING
            .iter()
            .map(|&tuning| {
                let length = ((tuning + spread) as f32 * scale) as usize;
                // Feedback that reaches -60 dB after `decay` seconds.
                let feedback = 10f32.powf(-3.0 * length as f32 / (decay * sample_rate as f32));
                Comb::new(length, feedback, preset.damping())
            })
            .collect();
        let allpasses = ALLPASS_TUNING
            .iter()
            .map(|&tuning| Allpass::new(((tuning + spread) as f32 * scale) as usize))
            .collect();
        Self { combs, allpasses }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut out: f32 = self.combs.iter_mut().map(|comb| comb.process(input)).sum();
        out *= 0.25;
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }
}

/// Stereo late reverb for one voice.
#[derive(Debug)]
pub struct Reverb {
    predelay: Vec<f32>,
    predelay_index: usize,
    left: Channel,
    right: Channel,
    wet: f32,
}

impl Reverb {
    /// Builds the network for `preset`, or `None` for [`ReverbPreset::None`].
    pub fn new(preset: ReverbPreset, sample_rate: u32) -> Option<Self> {
        if preset == ReverbPreset::None {
            return None;
        }
        let predelay_len = (preset.predelay_ms() / 1000.0 * sample_rate as f32) as usize;
        Some(Self {
            predelay: vec![0.0; predelay_len.max(1)],
            predelay_index: 0,
            left: Channel::new(preset, sample_rate, 0),
            right: Channel::new(preset, sample_rate, STEREO_SPREAD),
            wet: preset.wet_gain(),
        })
    }

    /// Feeds `input * send` into the room and adds the wet signal to interleaved stereo `output`.
    pub fn process(&mut self, input: &[f32], send: f32, output: &mut [f32]) {
        for (sample, frame) in input.iter().zip(output.chunks_exact_mut(2)) {
            let delayed = self.predelay[self.predelay_index];
            self.predelay[self.predelay_index] = sample * send;
            self.predelay_index = (self.predelay_index + 1) % self.predelay.len();

            frame[0] += self.left.process(delayed) * self.wet;
            frame[1] += self.right.process(delayed) * self.wet;
        }
    }
}
