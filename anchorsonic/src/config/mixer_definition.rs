use uuid::Uuid;

/// Propagation paths simulated by a spatial pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialPipelineFlags {
    /// Direct sound from source to listener, spatialized by the HRTF/panner
    pub direct_path_transmission: bool,
    /// Diffuse late reverberation from the engine's room model
    pub late_reverb: bool,
}

impl SpatialPipelineFlags {
    pub const DIRECT_PATH: Self = Self {
        direct_path_transmission: true,
        late_reverb: false,
    };

    pub const DIRECT_PATH_AND_LATE_REVERB: Self = Self {
        direct_path_transmission: true,
        late_reverb: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.direct_path_transmission && !self.late_reverb
    }
}

/// Which paths are rendered and how much of the signal is sent to each.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialPipeline {
    pub flags: SpatialPipelineFlags,
    /// Linear send level into the late reverb (0.0 - 1.0)
    pub late_reverb_send_level: f32,
}

impl SpatialPipeline {
    pub fn new(flags: SpatialPipelineFlags) -> Self {
        Self {
            flags,
            late_reverb_send_level: if flags.late_reverb { 1.0 } else { 0.0 },
        }
    }

    pub fn late_reverb_send_level(mut self, level: f32) -> Self {
        self.late_reverb_send_level = level;
        self
    }
}

/// Distance beyond which a source is culled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeOutParameters {
    pub cull_distance: f32,
}

/// Maps source-listener distance to attenuation and culling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceModel {
    /// No attenuation and no culling
    None,
    /// Geometric spreading: `(1 m / d)^rolloff`, never amplifying closer than one meter
    GeometricSpreading {
        rolloff_factor: f32,
        fade_out: Option<FadeOutParameters>,
    },
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self::GeometricSpreading {
            rolloff_factor: 1.0,
            fade_out: None,
        }
    }
}

impl DistanceModel {
    pub fn geometric_spreading(rolloff_factor: f32) -> Self {
        Self::GeometricSpreading {
            rolloff_factor,
            fade_out: None,
        }
    }

    pub fn cull_distance(self, cull_distance: f32) -> Self {
        match self {
            Self::GeometricSpreading { rolloff_factor, .. } => Self::GeometricSpreading {
                rolloff_factor,
                fade_out: Some(FadeOutParameters { cull_distance }),
            },
            Self::None => Self::None,
        }
    }

    /// True when a source at `distance` lies beyond the fade-out cull distance.
    pub fn is_culled(&self, distance: f32) -> bool {
        match *self {
            Self::GeometricSpreading {
                fade_out: Some(fade_out),
                ..
            } => distance > fade_out.cull_distance,
            _ => false,
        }
    }

    /// Attenuation at `distance`, ignoring culling.
    ///
    /// `min_distance` is the closest the listener can get to the emitting surface.
    pub fn attenuation(&self, distance: f32, min_distance: f32) -> f32 {
        match *self {
            Self::None => 1.0,
            Self::GeometricSpreading { rolloff_factor, .. } => {
                let effective = distance.max(min_distance).max(f32::EPSILON);
                effective.recip().powf(rolloff_factor).min(1.0)
            }
        }
    }

    /// Gain for a source at `distance`, or `None` when the source is culled.
    pub fn gain(&self, distance: f32, min_distance: f32) -> Option<f32> {
        if self.is_culled(distance) {
            None
        } else {
            Some(self.attenuation(distance, min_distance))
        }
    }
}

/// Spatial mixer configuration: pipeline plus distance model.
///
/// Each definition carries a generated identifier; mixer parameters bind a concrete
/// source/listener pair against it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialMixerDefinition {
    identifier: String,
    pub pipeline: SpatialPipeline,
    pub distance_model: DistanceModel,
}

impl SpatialMixerDefinition {
    pub fn new(pipeline: SpatialPipeline) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            pipeline,
            distance_model: DistanceModel::default(),
        }
    }

    pub fn with_distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.pipeline.flags.is_empty() {
            return Err(format!("mixer {} simulates no propagation path", self.identifier));
        }
        let send = self.pipeline.late_reverb_send_level;
        if !(0.0..=1.0).contains(&send) {
            return Err(format!("late reverb send level {send} outside 0..=1"));
        }
        if let DistanceModel::GeometricSpreading {
            rolloff_factor,
            fade_out,
        } = self.distance_model
        {
            if !rolloff_factor.is_finite() || rolloff_factor < 0.0 {
                return Err(format!("rolloff factor {rolloff_factor} must be >= 0"));
            }
            if let Some(fade_out) = fade_out {
                if !(fade_out.cull_distance > 0.0) {
                    return Err(format!(
                        "cull distance {} must be positive",
                        fade_out.cull_distance
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn geometric_spreading_follows_inverse_distance() {
        let model = DistanceModel::geometric_spreading(1.0).cull_distance(10.0);
        assert_relative_eq!(model.gain(2.0, 0.01).unwrap(), 0.5);
        assert_relative_eq!(model.gain(4.0, 0.01).unwrap(), 0.25);
        assert_relative_eq!(model.gain(0.2, 0.01).unwrap(), 1.0);
        assert!(model.gain(10.5, 0.01).is_none());
    }

    #[test]
    fn rolloff_factor_steepens_the_curve() {
        let model = DistanceModel::geometric_spreading(2.0);
        assert_relative_eq!(model.gain(2.0, 0.01).unwrap(), 0.25);
        assert!(model.gain(1000.0, 0.01).is_some());
    }

    #[test]
    fn mixer_identifiers_are_unique() {
        let pipeline = SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH);
        let a = SpatialMixerDefinition::new(pipeline);
        let b = SpatialMixerDefinition::new(pipeline);
        assert_ne!(a.identifier(), b.identifier());
        assert_eq!(a.clone().identifier(), a.identifier());
    }

    #[test]
    fn validation_catches_bad_numbers() {
        let empty = SpatialPipeline::new(SpatialPipelineFlags {
            direct_path_transmission: false,
            late_reverb: false,
        });
        assert!(SpatialMixerDefinition::new(empty).validate().is_err());

        let loud_send = SpatialPipeline::new(SpatialPipelineFlags::DIRECT_PATH_AND_LATE_REVERB)
            .late_reverb_send_level(1.5);
        assert!(SpatialMixerDefinition::new(loud_send).validate().is_err());

        let bad_cull = SpatialMixerDefinition::new(SpatialPipeline::new(
            SpatialPipelineFlags::DIRECT_PATH,
        ))
        .with_distance_model(DistanceModel::geometric_spreading(1.0).cull_distance(0.0));
        assert!(bad_cull.validate().is_err());
    }
}
