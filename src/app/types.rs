use crate::media::{CaptureDevice, Orientation, RecordingMode};
use crate::recorder::SessionState;
use crate::timeline::TimelineClip;
use serde::Serialize;
use uuid::Uuid;

/// Why the studio loop exited
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Requested(String),
    Error(String),
}

/// Choices the UI has made for the next capture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudioSettings {
    pub mode: RecordingMode,
    /// Explicit orientation; `None` lets the platform pick within range
    pub orientation: Option<Orientation>,
    pub video_device_id: Option<String>,
    pub audio_device_id: Option<String>,
    /// Keep a preview on screen whenever nothing is recording
    pub preview_enabled: bool,
}

/// Everything the UI renders
#[derive(Debug, Clone, Serialize)]
pub struct StudioSnapshot {
    pub session_state: SessionState,
    pub mode: RecordingMode,
    pub orientation: Option<Orientation>,
    pub video_devices: Vec<CaptureDevice>,
    pub audio_devices: Vec<CaptureDevice>,
    pub preview_session: Option<Uuid>,
    pub clips: Vec<TimelineClip>,
    pub edited_duration: f64,
    pub can_undo: bool,
    pub can_redo: bool,
    pub prompt_line: Option<String>,
}
