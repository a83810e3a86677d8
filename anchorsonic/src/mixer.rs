// Mixer module - renders every started sound event into the engine's output blocks.
// Runs wherever blocks are pulled from: the caller's thread in offline mode, the
// render thread with device output.

use crate::config::EngineDesc;
use crate::events::AnchorSonicEvent;
use crate::playback::{RenderCommand, Voice, VoiceEvent};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Highest absolute sample value the renderer emits.
pub(crate) const OUTPUT_CEILING: f32 = 0.98;
const LIMITER_ATTACK_MS: f32 = 0.5;
const LIMITER_RELEASE_MS: f32 = 50.0;

struct ActiveEvent {
    event_id: u64,
    voices: Vec<Voice>,
    completed: Arc<AtomicBool>,
}

/// Block renderer owning the voices of all started sound events.
pub(crate) struct Renderer {
    channels: usize,
    block_size: usize,
    commands: Receiver<RenderCommand>,
    events: Sender<AnchorSonicEvent>,
    active: Vec<ActiveEvent>,
    scratch: Vec<f32>,
    stereo: Vec<f32>,
    voice_events: Vec<VoiceEvent>,
    limiter: PeakLimiter,
}

/// Peak limiter on the stereo bus. Both channels share one gain so the image does not
/// shift while it engages.
struct PeakLimiter {
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl PeakLimiter {
    fn new(sample_rate: u32) -> Self {
        let sample_rate = (sample_rate as f32).max(1.0);
        Self {
            gain: 1.0,
            attack_coeff: time_to_coeff(LIMITER_ATTACK_MS, sample_rate),
            release_coeff: time_to_coeff(LIMITER_RELEASE_MS, sample_rate),
        }
    }

    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let left = if left.is_finite() { left } else { 0.0 };
        let right = if right.is_finite() { right } else { 0.0 };
        let peak = left.abs().max(right.abs());
        let target = if peak > OUTPUT_CEILING {
            OUTPUT_CEILING / peak
        } else {
            1.0
        };
        let coeff = if target < self.gain {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain = coeff * self.gain + (1.0 - coeff) * target;

        // The smoothed gain lags a sudden peak; the clamp catches what it lets through.
        (
            (left * self.gain).clamp(-OUTPUT_CEILING, OUTPUT_CEILING),
            (right * self.gain).clamp(-OUTPUT_CEILING, OUTPUT_CEILING),
        )
    }
}

fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let time_s = time_ms.max(0.0) * 0.001;
    if time_s <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_s * sample_rate)).exp()
    }
}

impl Renderer {
    pub fn new(
        desc: &EngineDesc,
        commands: Receiver<RenderCommand>,
        events: Sender<AnchorSonicEvent>,
    ) -> Self {
        Self {
            channels: desc.channels as usize,
            block_size: desc.block_size,
            commands,
            events,
            active: Vec::new(),
            scratch: vec![0.0; desc.block_size],
            stereo: vec![0.0; desc.block_size * 2],
            voice_events: Vec::new(),
            limiter: PeakLimiter::new(desc.sample_rate),
        }
    }

    pub fn active_events(&self) -> usize {
        self.active.len()
    }

    /// Applies every pending command.
    pub fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RenderCommand::Start {
                    event_id,
                    voices,
                    completed,
                } => {
                    log::debug!(
                        "Mixer: Starting sound event {} with {} voice(s)",
                        event_id,
                        voices.len()
                    );
                    self.active.push(ActiveEvent {
                        event_id,
                        voices,
                        completed,
                    });
                    self.emit(AnchorSonicEvent::SoundEventStarted { event_id });
                }
                RenderCommand::Stop { event_id } => {
                    let before = self.active.len();
                    self.active.retain(|event| event.event_id != event_id);
                    if self.active.len() != before {
                        log::debug!("Mixer: Released voices of sound event {}", event_id);
                    }
                    self.emit(AnchorSonicEvent::SoundEventStopped { event_id });
                }
            }
        }
    }

    /// Renders one block of `block_size * channels` interleaved samples into `output`.
    pub fn render_block(&mut self, output: &mut [f32]) {
        self.process_commands();
        self.stereo.fill(0.0);

        let mut finished = Vec::new();
        for event in &mut self.active {
            for voice in &mut event.voices {
                if let Err(e) = voice.render(&mut self.scratch, &mut self.stereo, &mut self.voice_events) {
                    log::error!("Error rendering sound event {}: {}", event.event_id, e);
                    let _ = self.events.send(AnchorSonicEvent::EngineError {
                        error: e.to_string(),
                    });
                }
            }

            for voice_event in self.voice_events.drain(..) {
                let event_id = event.event_id;
                let _ = self.events.send(match voice_event {
                    VoiceEvent::Looped(loop_count) => AnchorSonicEvent::SoundEventLooped {
                        event_id,
                        loop_count,
                    },
                    VoiceEvent::Culled => AnchorSonicEvent::SoundEventCulled { event_id },
                    VoiceEvent::Woke => AnchorSonicEvent::SoundEventWoke { event_id },
                });
            }

            if event.voices.iter().all(Voice::is_finished) {
                finished.push(event.event_id);
            }
        }

        // Finished events leave the mix; the SoundEvent handle still has to be invalidated.
        for event_id in finished {
            if let Some(index) = self.active.iter().position(|e| e.event_id == event_id) {
                let event = self.active.swap_remove(index);
                event.completed.store(true, Ordering::Release);
                log::info!("Mixer: Sound event {} completed", event_id);
                self.emit(AnchorSonicEvent::SoundEventCompleted { event_id });
            }
        }

        self.write_output(output);
    }

    fn write_output(&mut self, output: &mut [f32]) {
        let frames = (output.len() / self.channels).min(self.block_size);
        for frame in 0..frames {
            let (left, right) = self
                .limiter
                .process(self.stereo[frame * 2], self.stereo[frame * 2 + 1]);
            match self.channels {
                1 => output[frame] = (left + right) * 0.5,
                _ => {
                    output[frame * 2] = left;
                    output[frame * 2 + 1] = right;
                }
            }
        }
    }

    fn emit(&self, event: AnchorSonicEvent) {
        let _ = self.events.send(event);
    }
}
