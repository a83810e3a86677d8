//! The rendering engine: asset registry, scene root and block renderer.

#[cfg(feature = "device-output")]
mod device;

use crate::audio_data::{AnchorSonicAudioData, NormalizationMode};
use crate::config::{EngineDesc, OutputMode, SoundEventNode};
use crate::error::{AnchorSonicError, AssetError, Result, SoundEventError};
use crate::events::AnchorSonicEvent;
use crate::mixer::Renderer;
use crate::playback::RenderCommand;
use crate::registry::{AssetRegistry, ChannelLayout, SoundAssetHandle, SoundEventAssetHandle};
use crate::scene::SceneRoot;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between the engine and the sound events created against it.
pub(crate) struct EngineShared {
    pub id: u64,
    pub desc: EngineDesc,
    registry: Mutex<AssetRegistry>,
    pub root: SceneRoot,
    commands: Sender<RenderCommand>,
    pub running: AtomicBool,
    pub live_events: AtomicUsize,
    next_event_id: AtomicU64,
}

impl EngineShared {
    pub fn registry(&self) -> MutexGuard<'_, AssetRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn next_event_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn send(&self, command: RenderCommand) -> std::result::Result<(), SoundEventError> {
        self.commands
            .send(command)
            .map_err(|e| SoundEventError::Disconnected(e.to_string()))
    }
}

/// Audio engine that owns registered assets, the scene root and the renderer.
///
/// With [`OutputMode::Offline`] the caller pulls blocks with
/// [`render_offline`](Self::render_offline). With `OutputMode::Device` (feature
/// `device-output`) a render thread feeds the default output device.
pub struct AnchorSonicEngine {
    shared: Arc<EngineShared>,
    renderer: Arc<Mutex<Renderer>>,
    event_sender: Sender<AnchorSonicEvent>,
    event_receiver: Receiver<AnchorSonicEvent>,
    frames_rendered: Arc<AtomicUsize>,
    #[cfg(feature = "device-output")]
    device: Mutex<Option<device::DeviceOutput>>,
}

impl AnchorSonicEngine {
    /// Create a new audio engine with the given configuration
    pub fn new(desc: EngineDesc) -> Result<Self> {
        desc.validate()?;

        let (command_sender, command_receiver) = unbounded();
        let (event_sender, event_receiver) = unbounded();
        let renderer = Renderer::new(&desc, command_receiver, event_sender.clone());
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);

        log::info!(
            "Created engine {} ({} Hz, {} frames/block, {} channel(s), {:?} output)",
            id,
            desc.sample_rate,
            desc.block_size,
            desc.channels,
            desc.output
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                id,
                registry: Mutex::new(AssetRegistry::new(desc.sample_rate, desc.channels)),
                root: SceneRoot::new(id),
                commands: command_sender,
                running: AtomicBool::new(false),
                live_events: AtomicUsize::new(0),
                next_event_id: AtomicU64::new(1),
                desc,
            }),
            renderer: Arc::new(Mutex::new(renderer)),
            event_sender,
            event_receiver,
            frames_rendered: Arc::new(AtomicUsize::new(0)),
            #[cfg(feature = "device-output")]
            device: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Get the engine configuration
    pub fn config(&self) -> &EngineDesc {
        &self.shared.desc
    }

    /// Root object of the scene graph.
    pub fn root(&self) -> &SceneRoot {
        &self.shared.root
    }

    /// Check if the engine is currently running
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Number of audio frames rendered since creation
    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Sound events that exist and have not been invalidated.
    pub fn live_sound_events(&self) -> usize {
        self.shared.live_events.load(Ordering::Acquire)
    }

    pub fn register_sound_asset(
        &self,
        path: impl AsRef<Path>,
        identifier: &str,
        layout: ChannelLayout,
        normalization: NormalizationMode,
    ) -> std::result::Result<SoundAssetHandle, AssetError> {
        self.shared
            .registry()
            .register_sound_asset(path, identifier, layout, normalization)
    }

    pub fn register_sound_asset_data(
        &self,
        data: Arc<AnchorSonicAudioData>,
        identifier: &str,
        layout: ChannelLayout,
        normalization: NormalizationMode,
    ) -> std::result::Result<SoundAssetHandle, AssetError> {
        self.shared
            .registry()
            .register_sound_asset_data(data, identifier, layout, normalization)
    }

    pub fn register_sound_event_asset(
        &self,
        root: SoundEventNode,
        identifier: &str,
    ) -> std::result::Result<SoundEventAssetHandle, AssetError> {
        self.shared.registry().register_sound_event_asset(root, identifier)
    }

    /// Removes an asset; `Ok(false)` if `identifier` was not registered.
    pub fn unregister_asset(&self, identifier: &str) -> std::result::Result<bool, AssetError> {
        self.shared.registry().unregister_asset(identifier)
    }

    pub fn has_asset(&self, identifier: &str) -> bool {
        self.shared.registry().contains(identifier)
    }

    /// Start the engine. Starting a running engine is a no-op.
    pub fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        match self.shared.desc.output {
            OutputMode::Offline => {}
            #[cfg(feature = "device-output")]
            OutputMode::Device => {
                let output = device::DeviceOutput::start(
                    &self.shared.desc,
                    self.renderer.clone(),
                    self.frames_rendered.clone(),
                    self.event_sender.clone(),
                )?;
                *self.device.lock().unwrap_or_else(PoisonError::into_inner) = Some(output);
            }
        }

        self.shared.running.store(true, Ordering::Release);
        let _ = self.event_sender.send(AnchorSonicEvent::EngineStarted);
        log::info!("Engine {} started", self.shared.id);
        Ok(())
    }

    /// Stop the engine.
    ///
    /// # Errors
    ///
    /// [`AnchorSonicError::Engine`] while sound events created against this engine have
    /// not been invalidated.
    pub fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        let live = self.live_sound_events();
        if live > 0 {
            return Err(AnchorSonicError::Engine(format!(
                "cannot stop engine while {} sound event(s) are live",
                live
            )));
        }
        self.halt();
        Ok(())
    }

    fn halt(&self) {
        self.shared.running.store(false, Ordering::Release);
        #[cfg(feature = "device-output")]
        if let Some(output) = self.device.lock().unwrap_or_else(PoisonError::into_inner).take() {
            output.stop();
        }
        let _ = self.event_sender.send(AnchorSonicEvent::EngineStopped);
        log::info!("Engine {} stopped", self.shared.id);
    }

    /// Renders audio into `output` on the calling thread.
    ///
    /// `output` must hold a whole number of blocks (`block_size * channels` samples each).
    /// Returns the number of frames rendered.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not running, is configured for device output, or if
    /// `output` is not a whole number of blocks.
    pub fn render_offline(&self, output: &mut [f32]) -> Result<usize> {
        if self.shared.desc.output != OutputMode::Offline {
            return Err(AnchorSonicError::Engine(
                "render_offline requires OutputMode::Offline".into(),
            ));
        }
        if !self.is_running() {
            return Err(AnchorSonicError::Engine("engine is not running".into()));
        }
        let block_len = self.shared.desc.block_len();
        if output.len() % block_len != 0 {
            return Err(AnchorSonicError::Configuration(format!(
                "output length {} is not a multiple of the block length {}",
                output.len(),
                block_len
            )));
        }

        let mut renderer = self
            .renderer
            .lock()
            .map_err(|_| AnchorSonicError::Engine("renderer lock poisoned".into()))?;
        for block in output.chunks_exact_mut(block_len) {
            renderer.render_block(block);
        }

        let frames = output.len() / self.shared.desc.channels as usize;
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
        Ok(frames)
    }

    /// Drains the events emitted since the last call.
    pub fn poll_events(&self) -> Vec<AnchorSonicEvent> {
        self.event_receiver.try_iter().collect()
    }

    /// Detaches every node from the root. Part of full teardown only.
    pub fn teardown_scene(&self) -> usize {
        let detached = self.shared.root.detach_all();
        log::debug!("Engine {} detached {} node(s)", self.shared.id, detached);
        detached
    }

    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }
}

impl Drop for AnchorSonicEngine {
    fn drop(&mut self) {
        if self.is_running() {
            let live = self.live_sound_events();
            if live > 0 {
                log::warn!(
                    "Engine {} dropped with {} live sound event(s)",
                    self.shared.id,
                    live
                );
            }
            self.halt();
        }
    }
}
