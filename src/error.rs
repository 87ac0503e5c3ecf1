use crate::media::MediaKind;
use crate::recorder::SessionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptcapError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Invalid operation: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PromptcapError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Stable error code for the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            PromptcapError::Config(_) => "CONFIG_ERROR",
            PromptcapError::Io(_) => "IO_ERROR",
            PromptcapError::Serialization(_) | PromptcapError::Deserialization(_) => {
                "SERIALIZATION_ERROR"
            }
            PromptcapError::Acquisition(e) => e.code(),
            PromptcapError::Recorder(RecorderError::Unsupported { .. }) => "RECORDER_UNSUPPORTED",
            PromptcapError::Recorder(_) => "RECORDER_ERROR",
            PromptcapError::Timeline(_) => "INVALID_OPERATION",
            PromptcapError::Session(SessionError::InvalidTransition { .. }) => "INVALID_OPERATION",
            PromptcapError::Session(_) => "SESSION_ERROR",
            PromptcapError::Export(_) => "EXPORT_ERROR",
            PromptcapError::EventBus(_) => "EVENT_BUS_ERROR",
            PromptcapError::System { .. } => "SYSTEM_ERROR",
            PromptcapError::Component { .. } => "COMPONENT_ERROR",
        }
    }
}

/// Failures while obtaining a live stream from the platform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("Permission denied for {kind} capture")]
    PermissionDenied { kind: MediaKind },

    #[error("Device unavailable ({}): {details}", .device_id.as_deref().unwrap_or("default"))]
    DeviceUnavailable {
        device_id: Option<String>,
        details: String,
    },

    #[error("Constraint '{constraint}' cannot be satisfied: {details}")]
    ConstraintUnsatisfiable { constraint: String, details: String },

    #[error("Platform does not support {feature}")]
    PlatformUnsupported { feature: String },
}

impl AcquisitionError {
    pub fn code(&self) -> &'static str {
        match self {
            AcquisitionError::PermissionDenied { .. } => "PERMISSION_DENIED",
            AcquisitionError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            AcquisitionError::ConstraintUnsatisfiable { .. } => "CONSTRAINT_UNSATISFIABLE",
            AcquisitionError::PlatformUnsupported { .. } => "PLATFORM_UNSUPPORTED",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecorderError {
    #[error("Recording is not supported: {details}")]
    Unsupported { details: String },

    #[error("Recorder failed to start: {details}")]
    StartFailed { details: String },

    #[error("Recorder failed: {details}")]
    Failed { details: String },
}

/// Rejected timeline edits; the clip sequence is left untouched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("split at {at:.3}s is outside the source (0..{duration:.3}s)")]
    SplitOutOfBounds { at: f64, duration: f64 },

    #[error("split at {at:.3}s falls on a clip boundary")]
    SplitAtBoundary { at: f64 },

    #[error("split at {at:.3}s does not fall inside any clip")]
    SplitOutsideClips { at: f64 },

    #[error("invalid range {start:.3}s..{end:.3}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("selection {bound} is not set")]
    SelectionUnset { bound: &'static str },

    #[error("index {index} out of bounds for {len} clips")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("cannot trim clip to {start:.3}s..{end:.3}s (source is {duration:.3}s)")]
    InvalidTrim { start: f64, end: f64, duration: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("cannot {action} while session is {from}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    #[error("session was cancelled during acquisition")]
    Cancelled,

    #[error("overlay mount failed: {details}")]
    Overlay { details: String },

    #[error("session {session_id} failed: {details}")]
    Failed { session_id: String, details: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("artifact {artifact_id} is empty")]
    EmptyArtifact { artifact_id: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode edit list: {0}")]
    EditList(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, PromptcapError>;
