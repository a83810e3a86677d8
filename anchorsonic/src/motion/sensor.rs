use super::{MotionEvent, MotionSample};
use crate::error::SensorError;
use crate::math::Orientation;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Source of head attitude updates.
pub trait HeadMotionSensor: Send {
    /// Whether the hardware (or script) can deliver at all.
    fn is_available(&self) -> bool;

    /// Whether a subscription is currently delivering.
    fn is_active(&self) -> bool;

    /// Starts delivering events into `sink` until the returned subscription is cancelled
    /// or dropped.
    fn subscribe(&mut self, sink: Sender<MotionEvent>) -> Result<SensorSubscription, SensorError>;
}

/// Handle to a running sensor delivery. Cancelling stops delivery; dropping cancels.
pub struct SensorSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SensorSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stops delivery. Returns once the sensor no longer sends.
    pub fn cancel(mut self) {
        self.cancel_now();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SensorSubscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for SensorSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSubscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Replays a fixed sequence of events from its own thread.
///
/// The sequence can be delivered once; afterwards the sensor reports itself unavailable.
pub struct ScriptedSensor {
    script: Option<Vec<MotionEvent>>,
    interval: Duration,
    active: Arc<AtomicBool>,
}

impl ScriptedSensor {
    /// Delivers `script` with `interval` between events. A zero interval delivers as fast
    /// as the consumer drains.
    pub fn new(script: Vec<MotionEvent>, interval: Duration) -> Self {
        Self {
            script: Some(script),
            interval,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Constant-rate yaw rotation sampled at `rate_hz` for `duration`.
    ///
    /// Yaw is reported wrapped to `(-180°, 180°]` the way attitude sensors do, so a sweep
    /// longer than one turn crosses the wrap point.
    pub fn yaw_sweep(rate_hz: f32, duration: Duration, degrees_per_second: f32) -> Self {
        let rate_hz = rate_hz.max(f32::EPSILON);
        let count = (duration.as_secs_f32() * rate_hz).round() as usize;
        let script = (0..count)
            .map(|i| {
                let t = i as f32 / rate_hz;
                let yaw = wrap_degrees(degrees_per_second * t);
                Orientation::from_yaw(yaw.to_radians())
                    .map(|attitude| MotionSample::new(attitude, Duration::from_secs_f32(t)))
                    .map_err(|e| SensorError::Sample(e.to_string()))
            })
            .collect();
        Self::new(script, Duration::from_secs_f32(1.0 / rate_hz))
    }

    /// Changes the delay between events.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Events left to deliver; zero once subscribed.
    pub fn remaining(&self) -> usize {
        self.script.as_ref().map_or(0, Vec::len)
    }
}

impl HeadMotionSensor for ScriptedSensor {
    fn is_available(&self) -> bool {
        self.script.is_some()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, sink: Sender<MotionEvent>) -> Result<SensorSubscription, SensorError> {
        if self.is_active() {
            return Err(SensorError::AlreadyActive);
        }
        let script = self.script.take().ok_or(SensorError::Unavailable)?;
        let interval = self.interval;
        let active = self.active.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let stop = cancelled.clone();

        active.store(true, Ordering::Release);
        let done = active.clone();
        let handle = std::thread::Builder::new()
            .name("anchorsonic-sensor".into())
            .spawn(move || {
                for event in script {
                    if stop.load(Ordering::Acquire) || sink.send(event).is_err() {
                        break;
                    }
                    if !interval.is_zero() {
                        std::thread::sleep(interval);
                    }
                }
                done.store(false, Ordering::Release);
            })
            .map_err(|e| {
                self.active.store(false, Ordering::Release);
                SensorError::Disconnected(e.to_string())
            })?;

        Ok(SensorSubscription::new(move || {
            cancelled.store(true, Ordering::Release);
            if handle.join().is_err() {
                log::error!("Scripted sensor thread panicked");
            }
            active.store(false, Ordering::Release);
        }))
    }
}

fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

type SinkSlot = Arc<Mutex<Option<Sender<MotionEvent>>>>;

/// Sensor driven by external code through a [`ManualSensorFeed`].
pub struct ManualSensor {
    available: bool,
    slot: SinkSlot,
}

/// Pushes events into a subscribed [`ManualSensor`].
#[derive(Clone)]
pub struct ManualSensorFeed {
    slot: SinkSlot,
}

impl ManualSensor {
    pub fn new() -> (Self, ManualSensorFeed) {
        let slot: SinkSlot = Arc::new(Mutex::new(None));
        (
            Self {
                available: true,
                slot: slot.clone(),
            },
            ManualSensorFeed { slot },
        )
    }

    /// A sensor that refuses every subscription.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl HeadMotionSensor for ManualSensor {
    fn is_available(&self) -> bool {
        self.available
    }

    fn is_active(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn subscribe(&mut self, sink: Sender<MotionEvent>) -> Result<SensorSubscription, SensorError> {
        if !self.available {
            return Err(SensorError::Unavailable);
        }
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SensorError::AlreadyActive);
        }
        *slot = Some(sink);

        let slot = self.slot.clone();
        Ok(SensorSubscription::new(move || {
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        }))
    }
}

impl ManualSensorFeed {
    /// Delivers `event`. Returns false when nobody is subscribed.
    pub fn push(&self, event: MotionEvent) -> bool {
        match self.slot.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    pub fn push_attitude(&self, attitude: Orientation, timestamp: Duration) -> bool {
        self.push(Ok(MotionSample::new(attitude, timestamp)))
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crossbeam_channel::unbounded;

    #[test]
    fn scripted_sensor_delivers_once() {
        let mut sensor = ScriptedSensor::new(
            vec![
                Ok(MotionSample::new(Orientation::IDENTITY, Duration::ZERO)),
                Err(SensorError::Sample("glitch".into())),
            ],
            Duration::ZERO,
        );
        assert!(sensor.is_available());
        assert_eq!(sensor.remaining(), 2);

        let (tx, rx) = unbounded();
        let subscription = sensor.subscribe(tx).unwrap();
        let received: Vec<_> = rx.iter().take(2).collect();
        assert!(received[0].is_ok());
        assert_eq!(received[1], Err(SensorError::Sample("glitch".into())));
        subscription.cancel();

        assert!(!sensor.is_active());
        assert!(!sensor.is_available());
        let (tx, _rx) = unbounded();
        assert!(matches!(sensor.subscribe(tx), Err(SensorError::Unavailable)));
    }

    #[test]
    fn yaw_sweep_wraps_like_a_sensor() {
        let sensor = ScriptedSensor::yaw_sweep(60.0, Duration::from_secs(5), 90.0);
        assert_eq!(sensor.remaining(), 300);
        assert_relative_eq!(wrap_degrees(190.0), -170.0, epsilon = 1e-4);
        assert_relative_eq!(wrap_degrees(-180.0), 180.0);
        assert_relative_eq!(wrap_degrees(45.0), 45.0);
    }

    #[test]
    fn manual_sensor_rejects_a_second_subscriber() {
        let (mut sensor, feed) = ManualSensor::new();
        assert!(!feed.push_attitude(Orientation::IDENTITY, Duration::ZERO));

        let (tx, rx) = unbounded();
        let subscription = sensor.subscribe(tx).unwrap();
        assert!(sensor.is_active());
        let (tx2, _rx2) = unbounded();
        assert!(matches!(sensor.subscribe(tx2), Err(SensorError::AlreadyActive)));

        assert!(feed.push_attitude(Orientation::from_yaw(0.5).unwrap(), Duration::from_millis(16)));
        assert_eq!(rx.try_iter().count(), 1);

        drop(subscription);
        assert!(!feed.is_subscribed());
        assert!(!sensor.is_active());
    }

    #[test]
    fn unavailable_manual_sensor() {
        let mut sensor = ManualSensor::unavailable();
        let (tx, _rx) = unbounded();
        assert!(!sensor.is_available());
        assert!(matches!(sensor.subscribe(tx), Err(SensorError::Unavailable)));
    }
}
