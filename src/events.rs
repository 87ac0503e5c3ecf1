use crate::error::EventBusError;
use crate::media::{MediaKind, Orientation};
use crate::recorder::{Artifact, SessionState};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Notifications delivered to the UI layer
#[derive(Debug, Clone)]
pub enum PromptcapEvent {
    /// The recording state machine moved to a new state
    SessionStateChanged {
        session_id: Option<Uuid>,
        state: SessionState,
        timestamp: SystemTime,
    },
    /// Device lists were re-fetched after a hot-plug notification
    DevicesChanged {
        video_devices: usize,
        audio_devices: usize,
        timestamp: SystemTime,
    },
    /// Devices of this kind are hidden until permission is granted
    PermissionNeeded { kind: MediaKind },
    /// Enumerating devices failed; the UI should show guidance
    DeviceAccessFailed { error: String },
    /// The platform delivered a stream in the other orientation
    OrientationMismatch {
        requested: Orientation,
        delivered_width: u32,
        delivered_height: u32,
    },
    /// The recorder emitted a fragment
    FragmentReceived {
        session_id: Uuid,
        index: usize,
        size: usize,
    },
    /// A recording finished and its artifact is ready for editing
    RecordingComplete { artifact: Artifact },
    /// A recording session failed
    SessionFailed {
        session_id: Option<Uuid>,
        code: &'static str,
        error: String,
    },
    /// A different session is bound to the preview sink
    PreviewChanged { session_id: Option<Uuid> },
    /// The clip sequence changed
    TimelineChanged {
        clip_count: usize,
        can_undo: bool,
        can_redo: bool,
    },
    /// An out-of-band control asked to stop the live session
    StopRequested { source: String },
    /// An export finished
    ExportCompleted { path: PathBuf },
    /// Application shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl PromptcapEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PromptcapEvent::SessionStateChanged { state, .. } => {
                format!("Session state changed to {}", state)
            }
            PromptcapEvent::DevicesChanged {
                video_devices,
                audio_devices,
                ..
            } => format!(
                "Devices changed: {} video, {} audio",
                video_devices, audio_devices
            ),
            PromptcapEvent::PermissionNeeded { kind } => {
                format!("Permission needed for {} devices", kind)
            }
            PromptcapEvent::DeviceAccessFailed { error } => {
                format!("Device access failed: {}", error)
            }
            PromptcapEvent::OrientationMismatch {
                requested,
                delivered_width,
                delivered_height,
            } => format!(
                "Requested {} but stream is {}x{}",
                requested, delivered_width, delivered_height
            ),
            PromptcapEvent::FragmentReceived { index, size, .. } => {
                format!("Fragment {} received ({} bytes)", index, size)
            }
            PromptcapEvent::RecordingComplete { artifact } => format!(
                "Recording complete: {} ({} bytes, {})",
                artifact.id,
                artifact.size(),
                artifact.mime_type
            ),
            PromptcapEvent::SessionFailed { code, error, .. } => {
                format!("Session failed [{}]: {}", code, error)
            }
            PromptcapEvent::PreviewChanged { session_id } => match session_id {
                Some(id) => format!("Preview bound to session {}", id),
                None => "Preview cleared".to_string(),
            },
            PromptcapEvent::TimelineChanged { clip_count, .. } => {
                format!("Timeline changed: {} clips", clip_count)
            }
            PromptcapEvent::StopRequested { source } => format!("Stop requested by {}", source),
            PromptcapEvent::ExportCompleted { path } => {
                format!("Export completed: {}", path.display())
            }
            PromptcapEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PromptcapEvent::SessionStateChanged { .. } => "session_state_changed",
            PromptcapEvent::DevicesChanged { .. } => "devices_changed",
            PromptcapEvent::PermissionNeeded { .. } => "permission_needed",
            PromptcapEvent::DeviceAccessFailed { .. } => "device_access_failed",
            PromptcapEvent::OrientationMismatch { .. } => "orientation_mismatch",
            PromptcapEvent::FragmentReceived { .. } => "fragment_received",
            PromptcapEvent::RecordingComplete { .. } => "recording_complete",
            PromptcapEvent::SessionFailed { .. } => "session_failed",
            PromptcapEvent::PreviewChanged { .. } => "preview_changed",
            PromptcapEvent::TimelineChanged { .. } => "timeline_changed",
            PromptcapEvent::StopRequested { .. } => "stop_requested",
            PromptcapEvent::ExportCompleted { .. } => "export_completed",
            PromptcapEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<PromptcapEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PromptcapEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied to every received event
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers, returning how many received it
    ///
    /// Publishing with nobody listening is not an error.
    pub async fn publish(&self, event: PromptcapEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            PromptcapEvent::SessionStateChanged { .. } | PromptcapEvent::RecordingComplete { .. } => {
                info!("{}", event.description());
            }
            PromptcapEvent::SessionFailed { .. } | PromptcapEvent::DeviceAccessFailed { .. } => {
                error!("{}", event.description());
            }
            PromptcapEvent::PermissionNeeded { .. } | PromptcapEvent::OrientationMismatch { .. } => {
                warn!("{}", event.description());
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept only events belonging to one recording session
    Session(Uuid),
    /// Custom filter function
    Custom(fn(&PromptcapEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &PromptcapEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Session(id) => match event {
                PromptcapEvent::SessionStateChanged { session_id, .. }
                | PromptcapEvent::SessionFailed { session_id, .. } => *session_id == Some(*id),
                PromptcapEvent::FragmentReceived { session_id, .. } => session_id == id,
                PromptcapEvent::RecordingComplete { artifact } => artifact.session_id == *id,
                _ => false,
            },
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering capabilities
pub struct EventReceiver {
    receiver: broadcast::Receiver<PromptcapEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<PromptcapEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<PromptcapEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<PromptcapEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
