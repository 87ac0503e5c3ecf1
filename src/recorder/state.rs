use crate::error::SessionError;
use crate::media::RecordingMode;
use crate::platform::OverlayId;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Recording lifecycle
///
/// `Idle -> Acquiring -> Live -> Stopping -> Complete`, with `Failed`
/// reachable from `Acquiring`, `Live` and `Stopping`. A cancelled
/// acquisition returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Acquiring,
    Live,
    Stopping,
    Complete,
    Failed,
}

impl SessionState {
    /// A new recording may begin from here
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Complete | SessionState::Failed
        )
    }

    /// Devices may be held in this state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::Live | SessionState::Stopping
        )
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle | Complete | Failed, Acquiring)
                | (Acquiring, Live | Failed | Idle)
                | (Live, Stopping | Failed)
                | (Stopping, Complete | Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Acquiring => "Acquiring",
            SessionState::Live => "Live",
            SessionState::Stopping => "Stopping",
            SessionState::Complete => "Complete",
            SessionState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Tags of the overlay surfaces mounted for a combined recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayElements {
    pub preview_tag: OverlayId,
    pub stop_control_tag: OverlayId,
}

/// One recording from start until its artifact is handed off
#[derive(Debug)]
pub struct RecordingSession {
    id: Uuid,
    mode: RecordingMode,
    state: SessionState,
    mime_type: String,
    chunks: Vec<Bytes>,
    overlay: Option<OverlayElements>,
}

impl RecordingSession {
    /// The MIME type is fixed here for the whole session
    pub fn new(mode: RecordingMode, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            state: SessionState::Idle,
            mime_type: mime_type.into(),
            chunks: Vec::new(),
            overlay: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> RecordingMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub fn overlay(&self) -> Option<OverlayElements> {
        self.overlay
    }

    pub fn set_overlay(&mut self, overlay: Option<OverlayElements>) {
        self.overlay = overlay;
    }

    pub fn transition(
        &mut self,
        next: SessionState,
        action: &'static str,
    ) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Append a fragment in emission order, returning its index
    pub fn push_chunk(&mut self, chunk: Bytes) -> usize {
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }

    pub fn total_size(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// Concatenate the fragments into the final artifact
    pub fn assemble(&self, duration: Duration) -> Artifact {
        let mut data = BytesMut::with_capacity(self.total_size());
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }

        Artifact {
            id: Uuid::new_v4(),
            session_id: self.id,
            data: data.freeze(),
            mime_type: self.mime_type.clone(),
            mode: self.mode,
            duration,
            fragment_count: self.chunks.len(),
            created_at: Utc::now(),
        }
    }
}

/// A finished recording as handed to editing and export
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: Uuid,
    pub session_id: Uuid,
    pub data: Bytes,
    pub mime_type: String,
    pub mode: RecordingMode,
    /// Wall-clock recording time
    pub duration: Duration,
    pub fragment_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Container extension for the declared MIME type
    pub fn file_extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

/// File extension for a container MIME type, codecs parameter ignored
pub fn extension_for_mime(mime: &str) -> &'static str {
    let container = mime.split(';').next().unwrap_or_default().trim();
    match container {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}
