use super::{HeadMotionSensor, MotionEvent, SensorSubscription};
use crate::error::{Result, SceneError};
use crate::math::{
    Mat4, MirrorAxis, Orientation, compute_listener_transform_mirrored, recenter_reference,
};
use crate::scene::{Listener, Node};
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Where sensor events are turned into listener transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryQueue {
    /// A background consumer thread applies events as they arrive
    #[default]
    Dedicated,
    /// Events wait until the owner calls [`MotionTracker::pump`]
    Caller,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingConfig {
    pub reference_frame: Mat4,
    pub mirror: MirrorAxis,
    pub delivery: DeliveryQueue,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            reference_frame: Mat4::IDENTITY,
            mirror: MirrorAxis::default(),
            delivery: DeliveryQueue::default(),
        }
    }
}

impl TrackingConfig {
    pub fn reference_frame(mut self, reference_frame: Mat4) -> Self {
        self.reference_frame = reference_frame;
        self
    }

    pub fn mirror(mut self, mirror: MirrorAxis) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn delivery(mut self, delivery: DeliveryQueue) -> Self {
        self.delivery = delivery;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    /// Sensor updates drive the listener
    Tracking,
    /// No sensor; the listener holds the reference frame
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingStats {
    /// Samples written into the listener
    pub applied: u64,
    /// Sensor errors and unusable samples
    pub dropped: u64,
}

struct TrackerState {
    listener: Node,
    mirror: MirrorAxis,
    reference_frame: Mutex<Mat4>,
    last_attitude: Mutex<Option<Orientation>>,
    applied: AtomicU64,
    dropped: AtomicU64,
}

impl TrackerState {
    fn reference_frame(&self) -> Mat4 {
        *self
            .reference_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn last_attitude(&self) -> Option<Orientation> {
        *self
            .last_attitude
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, event: MotionEvent) {
        let sample = match event {
            Ok(sample) => sample,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("Dropped motion sample: {}", e);
                return;
            }
        };

        match self.apply(&sample.attitude) {
            Ok(()) => {
                *self
                    .last_attitude
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(sample.attitude);
                self.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Motion sample at {:?} rejected: {}", sample.timestamp, e);
            }
        }
    }

    fn apply(&self, attitude: &Orientation) -> std::result::Result<(), SceneError> {
        let transform =
            compute_listener_transform_mirrored(attitude, self.reference_frame(), self.mirror);
        self.listener.set_transform(transform)
    }
}

/// Feeds head attitude from a sensor into a listener node.
///
/// If the sensor is unavailable or already in use, the tracker runs in
/// [`TrackingStatus::Static`]: the listener is set to the reference frame once and never
/// updated.
pub struct MotionTracker {
    state: Arc<TrackerState>,
    status: TrackingStatus,
    delivery: DeliveryQueue,
    subscription: Option<SensorSubscription>,
    pending: Option<Receiver<MotionEvent>>,
    consumer: Option<(Sender<()>, JoinHandle<()>)>,
}

impl MotionTracker {
    /// Subscribes to `sensor` and starts driving `listener`. The subscription outlives
    /// the sensor handle, which is dropped here.
    ///
    /// # Errors
    ///
    /// Fails if the reference frame is not finite or the consumer thread cannot be
    /// spawned. Sensor unavailability is not an error.
    pub fn start(
        mut sensor: impl HeadMotionSensor,
        listener: &Listener,
        config: TrackingConfig,
    ) -> Result<Self> {
        let listener: Node = (**listener).clone();
        if !config.reference_frame.is_finite() {
            return Err(SceneError::InvalidTransform(listener.id().raw()).into());
        }

        let state = Arc::new(TrackerState {
            listener,
            mirror: config.mirror,
            reference_frame: Mutex::new(config.reference_frame),
            last_attitude: Mutex::new(None),
            applied: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let mut tracker = Self {
            state,
            status: TrackingStatus::Static,
            delivery: config.delivery,
            subscription: None,
            pending: None,
            consumer: None,
        };

        if !sensor.is_available() || sensor.is_active() {
            log::info!(
                "Head motion sensor unavailable or busy, listener held at the reference frame"
            );
            tracker.hold_reference()?;
            return Ok(tracker);
        }

        let (sink, events) = unbounded();
        let subscription = match sensor.subscribe(sink) {
            Ok(subscription) => subscription,
            Err(e) => {
                log::info!("Head motion subscription refused ({}), tracking disabled", e);
                tracker.hold_reference()?;
                return Ok(tracker);
            }
        };

        match config.delivery {
            DeliveryQueue::Dedicated => {
                let (stop_tx, stop_rx) = bounded::<()>(1);
                let state = tracker.state.clone();
                let handle = std::thread::Builder::new()
                    .name("anchorsonic-motion".into())
                    .spawn(move || consume(state, events, stop_rx))?;
                tracker.consumer = Some((stop_tx, handle));
            }
            DeliveryQueue::Caller => tracker.pending = Some(events),
        }

        tracker.subscription = Some(subscription);
        tracker.status = TrackingStatus::Tracking;
        log::info!("Head tracking started ({:?} delivery)", config.delivery);
        Ok(tracker)
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn delivery(&self) -> DeliveryQueue {
        self.delivery
    }

    pub fn stats(&self) -> TrackingStats {
        TrackingStats {
            applied: self.state.applied.load(Ordering::Relaxed),
            dropped: self.state.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn reference_frame(&self) -> Mat4 {
        self.state.reference_frame()
    }

    /// Applies queued events on the calling thread. Only does work with
    /// [`DeliveryQueue::Caller`]. Returns the number of events handled.
    pub fn pump(&self) -> usize {
        let Some(events) = self.pending.as_ref() else {
            return 0;
        };
        let mut handled = 0;
        for event in events.try_iter() {
            self.state.handle(event);
            handled += 1;
        }
        handled
    }

    /// Replaces the reference frame and re-applies the last attitude against it.
    pub fn set_reference_frame(&self, reference_frame: Mat4) -> std::result::Result<(), SceneError> {
        if !reference_frame.is_finite() {
            return Err(SceneError::InvalidTransform(self.state.listener.id().raw()));
        }
        *self
            .state
            .reference_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reference_frame;

        match (self.status, self.state.last_attitude()) {
            (TrackingStatus::Static, _) => self.state.listener.set_transform(reference_frame),
            (TrackingStatus::Tracking, Some(attitude)) => self.state.apply(&attitude),
            (TrackingStatus::Tracking, None) => Ok(()),
        }
    }

    /// Makes the current head attitude the new "straight ahead". Returns false before
    /// the first sample.
    pub fn recenter(&self) -> std::result::Result<bool, SceneError> {
        let Some(attitude) = self.state.last_attitude() else {
            return Ok(false);
        };
        self.set_reference_frame(recenter_reference(&attitude))?;
        log::debug!("Head tracking recentered");
        Ok(true)
    }

    /// Cancels the sensor subscription and stops the consumer. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        if let Some((stop, handle)) = self.consumer.take() {
            let _ = stop.send(());
            if handle.join().is_err() {
                log::error!("Motion consumer thread panicked");
            }
        }
        if self.pending.take().is_some() || self.status == TrackingStatus::Tracking {
            let stats = self.stats();
            log::info!(
                "Head tracking stopped ({} applied, {} dropped)",
                stats.applied,
                stats.dropped
            );
        }
        self.status = TrackingStatus::Static;
    }

    fn hold_reference(&self) -> std::result::Result<(), SceneError> {
        self.state.listener.set_transform(self.state.reference_frame())
    }
}

impl Drop for MotionTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for MotionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionTracker")
            .field("status", &self.status)
            .field("delivery", &self.delivery)
            .field("stats", &self.stats())
            .finish()
    }
}

fn consume(state: Arc<TrackerState>, events: Receiver<MotionEvent>, stop: Receiver<()>) {
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => state.handle(event),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
}
