//! Head motion input: sensor abstraction and the tracker that drives the listener.
//!
//! A [`HeadMotionSensor`] delivers [`MotionEvent`]s over a channel. The
//! [`MotionTracker`] runs each sample through
//! [`compute_listener_transform_mirrored`](crate::math::compute_listener_transform_mirrored)
//! and writes the result into the listener node. Failed samples are dropped; the
//! listener keeps the last good transform.

mod sensor;
mod tracker;

pub use sensor::{
    HeadMotionSensor, ManualSensor, ManualSensorFeed, ScriptedSensor, SensorSubscription,
};
pub use tracker::{DeliveryQueue, MotionTracker, TrackingConfig, TrackingStats, TrackingStatus};

use crate::error::SensorError;
use crate::math::Orientation;
use std::time::Duration;

/// One attitude reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub attitude: Orientation,
    /// Time since the sensor began delivering
    pub timestamp: Duration,
}

impl MotionSample {
    pub fn new(attitude: Orientation, timestamp: Duration) -> Self {
        Self {
            attitude,
            timestamp,
        }
    }
}

/// What a sensor delivers per update.
pub type MotionEvent = Result<MotionSample, SensorError>;
