//! Asset registry: identifier -> registered sound or sound event asset.
//!
//! The engine owns one registry behind a mutex. Sound assets are decoded, checked
//! against the declared channel layout, resampled to the engine rate and optionally
//! normalized once, at registration. Live sound events lease the identifiers they
//! use so nothing they play can be unregistered underneath them.

use crate::audio_data::{
    AnchorSonicAudioData, AudioDataLoader, DefaultAudioLoader, LoadOptions, NormalizationMode,
};
use crate::config::SoundEventNode;
use crate::error::{AnchorSonicError, AssetError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Channel layout an asset is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channel_count(&self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

impl std::fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::Stereo => write!(f, "stereo"),
        }
    }
}

/// Summary of a registered sound asset.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundAssetHandle {
    pub identifier: String,
    pub layout: ChannelLayout,
    pub sample_rate: u32,
    pub total_frames: usize,
    pub duration: Duration,
}

/// Summary of a registered sound event asset.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEventAssetHandle {
    pub identifier: String,
    pub sampler_count: usize,
    pub mixer_identifiers: Vec<String>,
}

#[derive(Debug)]
pub(crate) enum RegisteredAsset {
    Sound {
        data: Arc<AnchorSonicAudioData>,
        layout: ChannelLayout,
    },
    SoundEvent(SoundEventNode),
}

#[derive(Debug)]
struct Entry {
    asset: RegisteredAsset,
    leases: usize,
}

/// Registered assets of one engine.
pub struct AssetRegistry {
    sample_rate: u32,
    output_channels: u16,
    loader: Box<dyn AudioDataLoader + Send>,
    entries: HashMap<String, Entry>,
}

impl AssetRegistry {
    /// Registry producing assets at `sample_rate` for an output route of `output_channels`.
    pub fn new(sample_rate: u32, output_channels: u16) -> Self {
        Self::with_loader(sample_rate, output_channels, DefaultAudioLoader)
    }

    pub fn with_loader(
        sample_rate: u32,
        output_channels: u16,
        loader: impl AudioDataLoader + Send + 'static,
    ) -> Self {
        Self {
            sample_rate,
            output_channels,
            loader: Box::new(loader),
            entries: HashMap::new(),
        }
    }

    /// Decodes the file at `path` and registers it as `identifier`.
    ///
    /// # Errors
    ///
    /// - [`AssetError::NotFound`] if the file does not exist
    /// - [`AssetError::Unreadable`] if it cannot be decoded
    /// - [`AssetError::UnsupportedChannelLayout`] if `layout` does not match the file or
    ///   the output route
    /// - [`AssetError::DuplicateIdentifier`] if `identifier` is taken
    pub fn register_sound_asset(
        &mut self,
        path: impl AsRef<Path>,
        identifier: &str,
        layout: ChannelLayout,
        normalization: NormalizationMode,
    ) -> Result<SoundAssetHandle, AssetError> {
        let path = path.as_ref();
        self.check_identifier(identifier)?;
        if !path.exists() {
            return Err(AssetError::NotFound(path.to_path_buf()));
        }

        let data = self
            .loader
            .load(path, &LoadOptions::default())
            .map_err(|e| match e {
                AnchorSonicError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    AssetError::NotFound(path.to_path_buf())
                }
                other => AssetError::Unreadable {
                    path: path.to_path_buf(),
                    reason: other.to_string(),
                },
            })?;

        let handle = self.insert_sound(data, identifier, layout, normalization)?;
        log::info!(
            "Registered sound asset '{}' from {} ({} frames, {})",
            identifier,
            path.display(),
            handle.total_frames,
            layout
        );
        Ok(handle)
    }

    /// Registers already-decoded audio as `identifier`.
    ///
    /// Same validation as [`register_sound_asset`](Self::register_sound_asset) without
    /// the file access.
    pub fn register_sound_asset_data(
        &mut self,
        data: Arc<AnchorSonicAudioData>,
        identifier: &str,
        layout: ChannelLayout,
        normalization: NormalizationMode,
    ) -> Result<SoundAssetHandle, AssetError> {
        self.check_identifier(identifier)?;
        let handle = self.insert_sound(data, identifier, layout, normalization)?;
        log::info!(
            "Registered sound asset '{}' from memory ({} frames, {})",
            identifier,
            handle.total_frames,
            layout
        );
        Ok(handle)
    }

    /// Registers a sound event graph as `identifier`.
    ///
    /// # Errors
    ///
    /// - [`AssetError::DuplicateIdentifier`] if `identifier` is taken
    /// - [`AssetError::MalformedGraph`] if the graph is structurally invalid or a sampler
    ///   references something other than a registered sound asset
    pub fn register_sound_event_asset(
        &mut self,
        root: SoundEventNode,
        identifier: &str,
    ) -> Result<SoundEventAssetHandle, AssetError> {
        self.check_identifier(identifier)?;

        let malformed = |reason: String| AssetError::MalformedGraph {
            identifier: identifier.to_string(),
            reason,
        };
        if let Some(reason) = root.structural_error() {
            return Err(malformed(reason));
        }
        for sampler in root.samplers() {
            match self.entries.get(&sampler.asset_identifier) {
                Some(Entry {
                    asset: RegisteredAsset::Sound { .. },
                    ..
                }) => {}
                Some(_) => {
                    return Err(malformed(format!(
                        "sampler references sound event asset '{}'",
                        sampler.asset_identifier
                    )));
                }
                None => {
                    return Err(malformed(format!(
                        "sampler references unknown asset '{}'",
                        sampler.asset_identifier
                    )));
                }
            }
        }

        let handle = SoundEventAssetHandle {
            identifier: identifier.to_string(),
            sampler_count: root.samplers().len(),
            mixer_identifiers: root.mixer_identifiers().into_iter().map(String::from).collect(),
        };
        self.entries.insert(
            identifier.to_string(),
            Entry {
                asset: RegisteredAsset::SoundEvent(root),
                leases: 0,
            },
        );
        log::info!(
            "Registered sound event asset '{}' ({} sampler(s))",
            identifier,
            handle.sampler_count
        );
        Ok(handle)
    }

    /// Removes `identifier`. Returns `Ok(false)` if nothing was registered under it.
    ///
    /// # Errors
    ///
    /// [`AssetError::InUse`] while a live sound event leases the asset; the registration
    /// is left intact.
    pub fn unregister_asset(&mut self, identifier: &str) -> Result<bool, AssetError> {
        match self.entries.get(identifier) {
            None => {
                log::debug!("Unregister of unknown asset '{}' ignored", identifier);
                Ok(false)
            }
            Some(entry) if entry.leases > 0 => Err(AssetError::InUse {
                identifier: identifier.to_string(),
                active: entry.leases,
            }),
            Some(_) => {
                self.entries.remove(identifier);
                log::info!("Unregistered asset '{}'", identifier);
                Ok(true)
            }
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identifiers in no particular order.
    pub fn identifiers(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of live sound events holding `identifier`.
    pub fn lease_count(&self, identifier: &str) -> usize {
        self.entries.get(identifier).map_or(0, |entry| entry.leases)
    }

    pub(crate) fn get(&self, identifier: &str) -> Option<&RegisteredAsset> {
        self.entries.get(identifier).map(|entry| &entry.asset)
    }

    /// Leases every identifier in `identifiers`. All must be registered.
    pub(crate) fn acquire(&mut self, identifiers: &[String]) {
        for identifier in identifiers {
            if let Some(entry) = self.entries.get_mut(identifier) {
                entry.leases += 1;
            }
        }
    }

    pub(crate) fn release(&mut self, identifiers: &[String]) {
        for identifier in identifiers {
            if let Some(entry) = self.entries.get_mut(identifier) {
                entry.leases = entry.leases.saturating_sub(1);
            }
        }
    }

    fn check_identifier(&self, identifier: &str) -> Result<(), AssetError> {
        if identifier.is_empty() {
            return Err(AssetError::EmptyIdentifier);
        }
        if self.entries.contains_key(identifier) {
            return Err(AssetError::DuplicateIdentifier(identifier.to_string()));
        }
        Ok(())
    }

    fn insert_sound(
        &mut self,
        data: Arc<AnchorSonicAudioData>,
        identifier: &str,
        layout: ChannelLayout,
        normalization: NormalizationMode,
    ) -> Result<SoundAssetHandle, AssetError> {
        let unsupported = |reason: String| AssetError::UnsupportedChannelLayout {
            layout: layout.to_string(),
            reason,
        };
        if data.channels() != layout.channel_count() {
            return Err(unsupported(format!(
                "audio has {} channel(s)",
                data.channels()
            )));
        }
        if layout.channel_count() > self.output_channels {
            return Err(unsupported(format!(
                "output route has {} channel(s)",
                self.output_channels
            )));
        }

        let resampled = data
            .resample(self.sample_rate)
            .map_err(|e| AssetError::Unreadable {
                path: identifier.into(),
                reason: e.to_string(),
            })?;
        let prepared = Arc::new(resampled.normalized(normalization));

        let handle = SoundAssetHandle {
            identifier: identifier.to_string(),
            layout,
            sample_rate: prepared.sample_rate(),
            total_frames: prepared.total_frames(),
            duration: prepared.duration(),
        };
        self.entries.insert(
            identifier.to_string(),
            Entry {
                asset: RegisteredAsset::Sound {
                    data: prepared,
                    layout,
                },
                leases: 0,
            },
        );
        Ok(handle)
    }
}

impl std::fmt::Debug for AssetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetRegistry")
            .field("sample_rate", &self.sample_rate)
            .field("output_channels", &self.output_channels)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        PlaybackMode, SamplerNodeDefinition, SpatialMixerDefinition, SpatialPipeline,
        SpatialPipelineFlags,
    };

    fn stereo_ping() -> Arc<AnchorSonicAudioData> {
        let samples = (0..4800)
            .flat_map(|i| {
                let s = (i as f32 * 0.05).sin() * 0.5;
                [s, s]
            })
            .collect();
        AnchorSonicAudioData::from_samples(samples, 48000, 2).unwrap()
    }

    fn looping_event(asset: &str) -> SoundEventNode {
        let mixer =
            SpatialMixerDefinition::new(SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH));
        SamplerNodeDefinition::new(asset, mixer)
            .playback_mode(PlaybackMode::Looping)
            .into()
    }

    #[test]
    fn registers_and_normalizes_sound_data() {
        let mut registry = AssetRegistry::new(48000, 2);
        let handle = registry
            .register_sound_asset_data(stereo_ping(), "ping", ChannelLayout::Stereo, NormalizationMode::Dynamic)
            .unwrap();
        assert_eq!(handle.total_frames, 4800);
        match registry.get("ping") {
            Some(RegisteredAsset::Sound { data, .. }) => assert!((data.peak() - 0.891).abs() < 1e-3),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicates_and_bad_layouts() {
        let mut registry = AssetRegistry::new(48000, 2);
        registry
            .register_sound_asset_data(stereo_ping(), "ping", ChannelLayout::Stereo, NormalizationMode::None)
            .unwrap();
        assert!(matches!(
            registry.register_sound_asset_data(stereo_ping(), "ping", ChannelLayout::Stereo, NormalizationMode::None),
            Err(AssetError::DuplicateIdentifier(id)) if id == "ping"
        ));
        assert!(matches!(
            registry.register_sound_asset_data(stereo_ping(), "mono", ChannelLayout::Mono, NormalizationMode::None),
            Err(AssetError::UnsupportedChannelLayout { .. })
        ));

        let mut mono_route = AssetRegistry::new(48000, 1);
        assert!(matches!(
            mono_route.register_sound_asset_data(stereo_ping(), "ping", ChannelLayout::Stereo, NormalizationMode::None),
            Err(AssetError::UnsupportedChannelLayout { .. })
        ));
        assert!(matches!(
            registry.register_sound_asset_data(stereo_ping(), "", ChannelLayout::Stereo, NormalizationMode::None),
            Err(AssetError::EmptyIdentifier)
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let mut registry = AssetRegistry::new(48000, 2);
        let result = registry.register_sound_asset(
            "no/such/ping.wav",
            "ping",
            ChannelLayout::Stereo,
            NormalizationMode::Dynamic,
        );
        assert!(matches!(result, Err(AssetError::NotFound(_))));
        assert!(!registry.contains("ping"));
    }

    #[test]
    fn sound_event_graph_must_reference_sound_assets() {
        let mut registry = AssetRegistry::new(48000, 2);
        assert!(matches!(
            registry.register_sound_event_asset(looping_event("ping"), "pingevent"),
            Err(AssetError::MalformedGraph { .. })
        ));

        registry
            .register_sound_asset_data(stereo_ping(), "ping", ChannelLayout::Stereo, NormalizationMode::None)
            .unwrap();
        let handle = registry
            .register_sound_event_asset(looping_event("ping"), "pingevent")
            .unwrap();
        assert_eq!(handle.sampler_count, 1);
        assert_eq!(handle.mixer_identifiers.len(), 1);

        assert!(matches!(
            registry.register_sound_event_asset(looping_event("pingevent"), "nested"),
            Err(AssetError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = AssetRegistry::new(48000, 2);
        assert_eq!(registry.unregister_asset("never"), Ok(false));

        registry
            .register_sound_asset_data(stereo_ping(), "ping", ChannelLayout::Stereo, NormalizationMode::None)
            .unwrap();
        assert_eq!(registry.unregister_asset("ping"), Ok(true));
        assert_eq!(registry.unregister_asset("ping"), Ok(false));
        assert!(!registry.contains("ping"));
        assert!(registry.is_empty());
    }

    #[test]
    fn leased_assets_cannot_be_unregistered() {
        let mut registry = AssetRegistry::new(48000, 2);
        registry
            .register_sound_asset_data(stereo_ping(), "ping", ChannelLayout::Stereo, NormalizationMode::None)
            .unwrap();
        let ids = vec!["ping".to_string()];
        registry.acquire(&ids);
        assert_eq!(registry.lease_count("ping"), 1);
        assert!(matches!(
            registry.unregister_asset("ping"),
            Err(AssetError::InUse { active: 1, .. })
        ));
        registry.release(&ids);
        assert_eq!(registry.unregister_asset("ping"), Ok(true));
    }
}
