//! Capture data model shared by every component.

mod constraints;
mod session;

pub use constraints::{
    camera_constraints, display_constraints, AudioConstraints, CaptureConstraints,
    ConstraintInputs, ConstraintValue, DisplayConstraints, DisplaySurface, VideoConstraints,
};
pub use session::{DeviceRegistry, MediaSession, MediaSessionState, OwnerRole, OwnerToken, SessionSource};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of capture device or track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// A camera or microphone reported by the platform
///
/// Never mutated; the catalog replaces its list wholesale on every re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDevice {
    pub id: String,
    pub kind: MediaKind,
    pub label: String,
    pub is_default: bool,
}

impl CaptureDevice {
    pub fn new<S: Into<String>>(id: S, kind: MediaKind, label: S, is_default: bool) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            is_default,
        }
    }

    /// Platforms report devices with an empty id until access is authorized
    pub fn is_authorized(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Where a track's media originates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackSource {
    Device { kind: MediaKind, device_id: String },
    Display,
}

impl TrackSource {
    pub fn device<S: Into<String>>(kind: MediaKind, device_id: S) -> Self {
        TrackSource::Device {
            kind,
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            TrackSource::Device { device_id, .. } => Some(device_id),
            TrackSource::Display => None,
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::Device { kind, device_id } => write!(f, "{}:{}", kind, device_id),
            TrackSource::Display => write!(f, "display"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    /// Orientation of a frame with the given dimensions; square counts as landscape
    pub fn of(width: u32, height: u32) -> Self {
        if height > width {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Landscape => write!(f, "landscape"),
            Orientation::Portrait => write!(f, "portrait"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Lay a landscape base resolution out in the requested orientation
    pub fn for_orientation(base: (u32, u32), orientation: Orientation) -> Self {
        let long = base.0.max(base.1);
        let short = base.0.min(base.1);
        match orientation {
            Orientation::Landscape => Self::new(long, short),
            Orientation::Portrait => Self::new(short, long),
        }
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::of(self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What a recording session captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    #[default]
    Camera,
    Screen,
    /// Screen plus camera, with a floating self-view over the screen
    Combined,
}

impl RecordingMode {
    pub fn uses_camera(&self) -> bool {
        matches!(self, RecordingMode::Camera | RecordingMode::Combined)
    }

    pub fn uses_screen(&self) -> bool {
        matches!(self, RecordingMode::Screen | RecordingMode::Combined)
    }
}

impl fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingMode::Camera => write!(f, "camera"),
            RecordingMode::Screen => write!(f, "screen"),
            RecordingMode::Combined => write!(f, "combined"),
        }
    }
}

impl FromStr for RecordingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "camera" => Ok(RecordingMode::Camera),
            "screen" => Ok(RecordingMode::Screen),
            "combined" | "both" => Ok(RecordingMode::Combined),
            other => Err(format!(
                "unknown recording mode '{}' (expected camera, screen or combined)",
                other
            )),
        }
    }
}
