use crate::config::SpatialMixerDefinition;

/// What a sampler does when it reaches the last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    #[default]
    OneShot,
    Looping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMode {
    /// Level in dB relative to the asset's normalized level
    RelativeSpl,
    /// Absolute SPL; the engine's reference SPL plays at unity gain
    AbsoluteSpl,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub mode: CalibrationMode,
    pub level_db: f32,
}

impl Calibration {
    pub fn relative_spl(level_db: f32) -> Self {
        Self {
            mode: CalibrationMode::RelativeSpl,
            level_db,
        }
    }

    pub fn absolute_spl(level_db: f32) -> Self {
        Self {
            mode: CalibrationMode::AbsoluteSpl,
            level_db,
        }
    }

    /// Linear gain for this calibration given the engine's reference SPL.
    pub fn gain(&self, reference_spl_db: f32) -> f32 {
        let db = match self.mode {
            CalibrationMode::RelativeSpl => self.level_db,
            CalibrationMode::AbsoluteSpl => self.level_db - reference_spl_db,
        };
        10f32.powf(db / 20.0)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::relative_spl(0.0)
    }
}

/// Behaviour of a sampler whose source moves beyond the cull distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullOption {
    /// Stop the sampler for good
    Terminate,
    /// Go silent; restart from the first frame when back in range
    SleepWakeAtZero,
    /// Go silent while the playback cursor keeps advancing in real time
    #[default]
    SleepWakeAtRealtimeOffset,
    /// Ignore culling and keep rendering
    DoNotCull,
}

/// Leaf of a sound event graph: plays one registered sound asset through a spatial mixer.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerNodeDefinition {
    pub asset_identifier: String,
    pub mixer: SpatialMixerDefinition,
    pub playback_mode: PlaybackMode,
    pub calibration: Calibration,
    pub cull_option: CullOption,
}

impl SamplerNodeDefinition {
    pub fn new(asset_identifier: impl Into<String>, mixer: SpatialMixerDefinition) -> Self {
        Self {
            asset_identifier: asset_identifier.into(),
            mixer,
            playback_mode: PlaybackMode::default(),
            calibration: Calibration::default(),
            cull_option: CullOption::default(),
        }
    }

    pub fn playback_mode(mut self, mode: PlaybackMode) -> Self {
        self.playback_mode = mode;
        self
    }

    pub fn calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn cull_option(mut self, option: CullOption) -> Self {
        self.cull_option = option;
        self
    }
}

/// Root of a sound event definition.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundEventNode {
    Sampler(SamplerNodeDefinition),
    /// Plays every child at the same time
    Container(Vec<SoundEventNode>),
}

impl From<SamplerNodeDefinition> for SoundEventNode {
    fn from(sampler: SamplerNodeDefinition) -> Self {
        Self::Sampler(sampler)
    }
}

impl SoundEventNode {
    /// All sampler leaves in depth-first order.
    pub fn samplers(&self) -> Vec<&SamplerNodeDefinition> {
        let mut out = Vec::new();
        self.collect_samplers(&mut out);
        out
    }

    fn collect_samplers<'a>(&'a self, out: &mut Vec<&'a SamplerNodeDefinition>) {
        match self {
            Self::Sampler(sampler) => out.push(sampler),
            Self::Container(children) => {
                for child in children {
                    child.collect_samplers(out);
                }
            }
        }
    }

    /// Identifiers of the distinct mixers used anywhere in the graph.
    pub fn mixer_identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for sampler in self.samplers() {
            let id = sampler.mixer.identifier();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Finds the first structural problem, if any.
    pub(crate) fn structural_error(&self) -> Option<String> {
        match self {
            Self::Sampler(sampler) => {
                if sampler.asset_identifier.is_empty() {
                    return Some("sampler references an empty asset identifier".into());
                }
                if !sampler.calibration.level_db.is_finite() {
                    return Some("calibration level must be finite".into());
                }
                sampler.mixer.validate().err()
            }
            Self::Container(children) if children.is_empty() => {
                Some("container node has no children".into())
            }
            Self::Container(children) => children.iter().find_map(Self::structural_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SpatialPipeline, SpatialPipelineFlags};
    use approx::assert_relative_eq;

    fn mixer() -> SpatialMixerDefinition {
        SpatialMixerDefinition::new(SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH))
    }

    #[test]
    fn calibration_gain() {
        assert_relative_eq!(Calibration::relative_spl(0.0).gain(85.0), 1.0);
        assert_relative_eq!(Calibration::relative_spl(-6.0).gain(85.0), 0.501, epsilon = 1e-3);
        assert_relative_eq!(Calibration::absolute_spl(85.0).gain(85.0), 1.0);
        assert_relative_eq!(Calibration::absolute_spl(65.0).gain(85.0), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn container_collects_samplers_and_shared_mixers_once() {
        let shared = mixer();
        let graph = SoundEventNode::Container(vec![
            SamplerNodeDefinition::new("a", shared.clone()).into(),
            SoundEventNode::Container(vec![
                SamplerNodeDefinition::new("b", shared.clone()).into(),
                SamplerNodeDefinition::new("c", mixer()).into(),
            ]),
        ]);
        let assets: Vec<_> = graph
            .samplers()
            .iter()
            .map(|s| s.asset_identifier.as_str())
            .collect();
        assert_eq!(assets, ["a", "b", "c"]);
        assert_eq!(graph.mixer_identifiers().len(), 2);
        assert!(graph.structural_error().is_none());
    }

    #[test]
    fn empty_container_is_malformed() {
        let graph = SoundEventNode::Container(vec![SoundEventNode::Container(Vec::new())]);
        assert!(graph.structural_error().is_some());
    }
}
