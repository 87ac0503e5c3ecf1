//! Capabilities the capture core consumes but does not implement.
//!
//! Device enumeration, stream acquisition, the fragment-emitting recorder,
//! the preview sink and the overlay compositor are all provided by the host
//! platform. [`simulated`] supplies an in-process implementation of each.

pub mod simulated;
#[cfg(test)]
mod tests;

pub use simulated::{
    MountedOverlay, PreviewSinkState, SimulatedOverlay, SimulatedPlatform, SimulatedPreviewSink,
    SimulatedRecorder, SimulatedTrack,
};

use crate::config::{OverlayConfig, OverlayCorner};
use crate::error::{AcquisitionError, RecorderError, Result, SessionError};
use crate::media::{
    CaptureConstraints, CaptureDevice, DisplayConstraints, MediaKind, Resolution, TrackSource,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Settings a track was actually delivered with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub device_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
}

impl TrackSettings {
    pub fn resolution(&self) -> Option<Resolution> {
        Some(Resolution::new(self.width?, self.height?))
    }
}

/// One live audio or video track
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    fn source(&self) -> &TrackSource;

    fn label(&self) -> &str;

    fn settings(&self) -> TrackSettings;

    /// False once the track was stopped or ended by the platform
    fn is_live(&self) -> bool;

    /// Stop the track. Stopping does not fire the ended signal.
    fn stop(&self);

    /// Flips to true when the platform ends the track on its own, e.g. the
    /// user dismissed screen sharing from the system UI.
    fn ended(&self) -> watch::Receiver<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; acquiring will prompt the user
    Prompt,
}

/// Device enumeration and stream acquisition
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    async fn enumerate_devices(&self) -> std::result::Result<Vec<CaptureDevice>, AcquisitionError>;

    fn permission(&self, kind: MediaKind) -> PermissionState;

    /// Prompt the user for access to devices of `kind`
    async fn request_permission(
        &self,
        kind: MediaKind,
    ) -> std::result::Result<PermissionState, AcquisitionError>;

    async fn get_user_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<Vec<Arc<dyn MediaTrack>>, AcquisitionError>;

    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> std::result::Result<Vec<Arc<dyn MediaTrack>>, AcquisitionError>;

    fn supports_display_capture(&self) -> bool;

    /// Fires whenever a device is plugged in or removed
    fn device_changes(&self) -> broadcast::Receiver<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecorderOptions {
    pub mime_type: String,
    /// Interval at which fragments are emitted
    pub timeslice: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Data(Bytes),
    Error(RecorderError),
    /// Finalized; no further events follow
    Stopped,
}

pub trait RecorderControl: Send + Sync {
    /// Ask the recorder to flush buffered data and finalize
    fn request_stop(&self);
}

/// A running recorder: its event stream plus a way to stop it
pub struct RecorderHandle {
    pub events: mpsc::UnboundedReceiver<RecorderEvent>,
    pub control: Box<dyn RecorderControl>,
}

impl fmt::Debug for RecorderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderHandle").finish_non_exhaustive()
    }
}

pub trait RecorderBackend: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn start(
        &self,
        tracks: Vec<Arc<dyn MediaTrack>>,
        options: RecorderOptions,
    ) -> std::result::Result<RecorderHandle, RecorderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

/// Where the floating self-view sits on screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayPlacement {
    pub corner: OverlayCorner,
    pub size: u32,
    pub margin: u32,
}

impl From<&OverlayConfig> for OverlayPlacement {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            corner: config.corner,
            size: config.self_view_size,
            margin: config.margin,
        }
    }
}

/// Always-on-top surfaces that live outside the normal window layout
pub trait OverlayCompositor: Send + Sync {
    /// Mount an input-transparent self-view showing `track`
    fn mount_self_view(
        &self,
        track: Arc<dyn MediaTrack>,
        placement: &OverlayPlacement,
    ) -> std::result::Result<OverlayId, SessionError>;

    /// Mount a stop control that cancels `on_stop` when pressed
    fn mount_stop_control(
        &self,
        on_stop: CancellationToken,
    ) -> std::result::Result<OverlayId, SessionError>;

    fn unmount(&self, id: OverlayId);
}

/// The single on-screen preview surface
pub trait PreviewSink: Send + Sync {
    fn attach(&self, session_id: Uuid, tracks: &[Arc<dyn MediaTrack>]);

    fn set_muted(&self, muted: bool);

    fn play(&self) -> Result<()>;

    fn detach(&self);
}
