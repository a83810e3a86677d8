//! Event types for AnchorSonic

/// Notifications emitted by the renderer, drained with
/// [`AnchorSonicEngine::poll_events`](crate::engine::AnchorSonicEngine::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorSonicEvent {
    SoundEventStarted {
        event_id: u64,
    },
    /// Every one-shot voice of the event played to its last frame
    SoundEventCompleted {
        event_id: u64,
    },
    SoundEventLooped {
        event_id: u64,
        loop_count: u32,
    },
    /// The event was invalidated and its voices were released
    SoundEventStopped {
        event_id: u64,
    },
    /// The source moved beyond the cull distance of one of the event's mixers
    SoundEventCulled {
        event_id: u64,
    },
    /// A sleeping voice came back within the cull distance
    SoundEventWoke {
        event_id: u64,
    },
    BufferUnderrun {
        missing_frames: usize,
    },
    EngineStarted,
    EngineStopped,
    EngineError {
        error: String,
    },
}

impl AnchorSonicEvent {
    pub fn event_id(&self) -> Option<u64> {
        match self {
            Self::SoundEventStarted { event_id }
            | Self::SoundEventCompleted { event_id }
            | Self::SoundEventLooped { event_id, .. }
            | Self::SoundEventStopped { event_id }
            | Self::SoundEventCulled { event_id }
            | Self::SoundEventWoke { event_id } => Some(*event_id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::BufferUnderrun { .. } | Self::EngineError { .. })
    }
}
