use crate::config::EngineDesc;
use crate::error::{AnchorSonicError, Result};
use crate::events::AnchorSonicEvent;
use crate::mixer::Renderer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Sender;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Output to the default device.
///
/// A render thread pulls blocks from the renderer into a ring buffer; the cpal callback
/// only pops from it, so the device callback never locks or allocates on the hot path.
pub(crate) struct DeviceOutput {
    stream: cpal::Stream,
    render_thread: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl DeviceOutput {
    pub fn start(
        desc: &EngineDesc,
        renderer: Arc<Mutex<Renderer>>,
        frames_rendered: Arc<AtomicUsize>,
        events: Sender<AnchorSonicEvent>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            AnchorSonicError::AudioDevice("No default output device available".into())
        })?;
        let default_config = device.default_output_config().map_err(|e| {
            AnchorSonicError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let config = cpal::StreamConfig {
            channels: desc.channels,
            sample_rate: cpal::SampleRate(desc.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let block_len = desc.block_len();
        let buffered = (desc.buffer_duration.as_secs_f64()
            * desc.sample_rate as f64
            * desc.channels as f64) as usize;
        let capacity = buffered.max(block_len * 2);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let active = Arc::new(AtomicBool::new(true));
        let render_thread = spawn_render_thread(
            block_len,
            desc.block_size,
            producer,
            renderer,
            frames_rendered,
            active.clone(),
        )?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, capacity, consumer, events)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, capacity, consumer, events)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, capacity, consumer, events)
            }
            _ => Err(AnchorSonicError::AudioFormat(
                "Unsupported sample format".into(),
            )),
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                halt_render_thread(&active, render_thread);
                return Err(e);
            }
        };

        if let Err(e) = stream.play() {
            halt_render_thread(&active, render_thread);
            return Err(AnchorSonicError::AudioDevice(format!(
                "Failed to start stream: {}",
                e
            )));
        }

        log::info!(
            "Device output running ({} Hz, {} channel(s), {:.0} ms buffered)",
            desc.sample_rate,
            desc.channels,
            desc.buffer_duration.as_secs_f64() * 1000.0
        );

        Ok(Self {
            stream,
            render_thread: Some(render_thread),
            active,
        })
    }

    /// Stops the render thread, then the stream.
    pub fn stop(mut self) {
        if let Some(handle) = self.render_thread.take() {
            halt_render_thread(&self.active, handle);
        }
        if let Err(e) = self.stream.pause() {
            log::warn!("Failed to pause output stream: {}", e);
        }
    }
}

fn halt_render_thread(active: &AtomicBool, handle: JoinHandle<()>) {
    active.store(false, Ordering::Release);
    if handle.join().is_err() {
        log::error!("Render thread panicked");
    }
}

fn spawn_render_thread(
    block_len: usize,
    block_size: usize,
    mut producer: HeapProd<f32>,
    renderer: Arc<Mutex<Renderer>>,
    frames_rendered: Arc<AtomicUsize>,
    active: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("anchorsonic-render".into())
        .spawn(move || {
            let mut block = vec![0.0f32; block_len];
            while active.load(Ordering::Acquire) {
                if producer.vacant_len() < block_len {
                    std::thread::sleep(Duration::from_millis(1));
                    continue;
                }
                match renderer.lock() {
                    Ok(mut renderer) => renderer.render_block(&mut block),
                    Err(_) => {
                        log::error!("Renderer lock poisoned, render thread exiting");
                        break;
                    }
                }
                producer.push_slice(&block);
                frames_rendered.fetch_add(block_size, Ordering::Relaxed);
            }
        })
        .map_err(AnchorSonicError::Io)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    capacity: usize,
    mut consumer: HeapCons<f32>,
    events: Sender<AnchorSonicEvent>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    // Sized once to the ring capacity; the callback works through `data` in chunks.
    let mut scratch = vec![0.0f32; capacity.max(1)];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let missing = fill_from_ring(data, &mut scratch, &mut consumer);
                if missing > 0 {
                    let _ = events.send(AnchorSonicEvent::BufferUnderrun {
                        missing_frames: missing / channels,
                    });
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AnchorSonicError::AudioDevice(format!("Failed to build stream: {}", e)))
}

/// Copies queued samples into `data`, padding with silence. Returns the number of samples
/// that had to be padded.
fn fill_from_ring<T>(
    data: &mut [T],
    scratch: &mut [f32],
    consumer: &mut HeapCons<f32>,
) -> usize
where
    T: SizedSample + FromSample<f32>,
{
    let mut missing = 0;
    for chunk in data.chunks_mut(scratch.len().max(1)) {
        let scratch = &mut scratch[..chunk.len()];
        let popped = consumer.pop_slice(scratch);
        if popped < chunk.len() {
            scratch[popped..].fill(0.0);
            missing += chunk.len() - popped;
        }
        for (out, sample) in chunk.iter_mut().zip(scratch.iter()) {
            *out = T::from_sample(*sample);
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn fills_callback_buffers_larger_than_scratch() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(64).split();
        let queued: Vec<f32> = (0..40).map(|i| i as f32 * 0.01).collect();
        producer.push_slice(&queued);

        let mut scratch = vec![0.0f32; 16];
        let mut data = vec![1.0f32; 48];
        let missing = fill_from_ring(&mut data, &mut scratch, &mut consumer);

        assert_eq!(scratch.len(), 16);
        assert_eq!(missing, 8);
        assert_eq!(&data[..40], &queued[..]);
        assert!(data[40..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn halting_joins_the_render_thread() {
        let desc = EngineDesc::default().block_size(64);
        let (_command_tx, command_rx) = unbounded();
        let (event_tx, _event_rx) = unbounded();
        let renderer = Arc::new(Mutex::new(Renderer::new(&desc, command_rx, event_tx)));
        let (producer, _consumer) = HeapRb::<f32>::new(desc.block_len() * 2).split();
        let frames_rendered = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicBool::new(true));

        let handle = spawn_render_thread(
            desc.block_len(),
            desc.block_size,
            producer,
            renderer.clone(),
            frames_rendered.clone(),
            active.clone(),
        )
        .unwrap();
        halt_render_thread(&active, handle);

        assert!(!active.load(Ordering::Acquire));
        assert_eq!(Arc::strong_count(&renderer), 1);
        assert_eq!(Arc::strong_count(&frames_rendered), 1);
    }
}
