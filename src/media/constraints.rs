use super::{RecordingMode, Resolution};
use crate::config::{AudioConfig, CameraConfig};
use serde::Serialize;

/// A single constraint as understood by the platform capture API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintValue<T> {
    /// The platform must deliver exactly this value or fail
    Exact(T),
    /// Preferred value; the platform may substitute
    Ideal(T),
    Range {
        min: Option<T>,
        ideal: Option<T>,
        max: Option<T>,
    },
}

impl<T: Clone + PartialOrd> ConstraintValue<T> {
    pub fn is_exact(&self) -> bool {
        matches!(self, ConstraintValue::Exact(_))
    }

    /// Value the platform should aim for
    pub fn target(&self) -> Option<T> {
        match self {
            ConstraintValue::Exact(v) | ConstraintValue::Ideal(v) => Some(v.clone()),
            ConstraintValue::Range { ideal, min, max } => {
                ideal.clone().or_else(|| max.clone()).or_else(|| min.clone())
            }
        }
    }

    /// Whether a delivered value satisfies the constraint
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            ConstraintValue::Exact(v) => v == value,
            ConstraintValue::Ideal(_) => true,
            ConstraintValue::Range { min, max, .. } => {
                min.as_ref().map_or(true, |m| value >= m)
                    && max.as_ref().map_or(true, |m| value <= m)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub device_id: Option<ConstraintValue<String>>,
    pub width: ConstraintValue<u32>,
    pub height: ConstraintValue<u32>,
    pub frame_rate: ConstraintValue<f64>,
    pub aspect_ratio: ConstraintValue<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub device_id: Option<ConstraintValue<String>>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: ConstraintValue<u32>,
}

/// Camera/microphone constraints, computed fresh for every negotiation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: Option<AudioConstraints>,
}

impl CaptureConstraints {
    pub fn video_device_id(&self) -> Option<&str> {
        match self.video.as_ref()?.device_id.as_ref()? {
            ConstraintValue::Exact(id) | ConstraintValue::Ideal(id) => Some(id),
            ConstraintValue::Range { .. } => None,
        }
    }

    pub fn audio_device_id(&self) -> Option<&str> {
        match self.audio.as_ref()?.device_id.as_ref()? {
            ConstraintValue::Exact(id) | ConstraintValue::Ideal(id) => Some(id),
            ConstraintValue::Range { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySurface {
    Monitor,
    Window,
    Browser,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConstraints {
    pub surface: DisplaySurface,
    pub width: ConstraintValue<u32>,
    pub height: ConstraintValue<u32>,
    pub frame_rate: ConstraintValue<f64>,
    pub audio: Option<AudioConstraints>,
}

/// Everything a constraint set is derived from
#[derive(Debug, Clone, Default)]
pub struct ConstraintInputs<'a> {
    pub mode: RecordingMode,
    pub resolution: Option<Resolution>,
    pub video_device_id: Option<&'a str>,
    pub audio_device_id: Option<&'a str>,
    pub is_mobile: bool,
    pub include_audio: bool,
    pub include_system_audio: bool,
}

fn frame_rate(camera: &CameraConfig, is_mobile: bool) -> f64 {
    if is_mobile {
        camera.mobile_frame_rate as f64
    } else {
        camera.frame_rate as f64
    }
}

fn audio_constraints(device_id: Option<&str>, audio: &AudioConfig) -> AudioConstraints {
    AudioConstraints {
        device_id: device_id.map(|id| ConstraintValue::Exact(id.to_string())),
        echo_cancellation: audio.echo_cancellation,
        noise_suppression: audio.noise_suppression,
        sample_rate: ConstraintValue::Ideal(audio.sample_rate),
    }
}

/// Build camera (and microphone) constraints
///
/// An explicitly chosen device or resolution pins width, height and frame
/// rate with exact constraints so the platform cannot silently swap the
/// orientation. Otherwise the configured resolution becomes an ideal within
/// the configured min/max range.
pub fn camera_constraints(
    inputs: &ConstraintInputs<'_>,
    camera: &CameraConfig,
    audio: &AudioConfig,
) -> CaptureConstraints {
    let fps = frame_rate(camera, inputs.is_mobile);
    let explicit = inputs.video_device_id.is_some() || inputs.resolution.is_some();

    let video = if explicit {
        let resolution = inputs
            .resolution
            .unwrap_or_else(|| Resolution::new(camera.resolution.0, camera.resolution.1));
        VideoConstraints {
            device_id: inputs
                .video_device_id
                .map(|id| ConstraintValue::Exact(id.to_string())),
            width: ConstraintValue::Exact(resolution.width),
            height: ConstraintValue::Exact(resolution.height),
            frame_rate: ConstraintValue::Exact(fps),
            aspect_ratio: ConstraintValue::Exact(resolution.aspect_ratio()),
        }
    } else {
        let mut ideal = Resolution::new(camera.resolution.0, camera.resolution.1);
        if inputs.is_mobile {
            ideal = Resolution::new(ideal.width.min(1280), ideal.height.min(720));
        }
        VideoConstraints {
            device_id: None,
            width: ConstraintValue::Range {
                min: Some(camera.min_resolution.0),
                ideal: Some(ideal.width),
                max: Some(camera.max_resolution.0),
            },
            height: ConstraintValue::Range {
                min: Some(camera.min_resolution.1),
                ideal: Some(ideal.height),
                max: Some(camera.max_resolution.1),
            },
            frame_rate: ConstraintValue::Range {
                min: None,
                ideal: Some(fps),
                max: Some(fps),
            },
            aspect_ratio: ConstraintValue::Ideal(ideal.aspect_ratio()),
        }
    };

    let audio = if inputs.include_audio && audio.enabled {
        Some(audio_constraints(inputs.audio_device_id, audio))
    } else {
        None
    };

    CaptureConstraints {
        video: Some(video),
        audio,
    }
}

/// Build monitor-level display capture constraints
///
/// Audio is only requested when system audio was asked for explicitly.
pub fn display_constraints(
    inputs: &ConstraintInputs<'_>,
    camera: &CameraConfig,
    audio: &AudioConfig,
) -> DisplayConstraints {
    DisplayConstraints {
        surface: DisplaySurface::Monitor,
        width: ConstraintValue::Ideal(camera.max_resolution.0),
        height: ConstraintValue::Ideal(camera.max_resolution.1),
        frame_rate: ConstraintValue::Ideal(frame_rate(camera, inputs.is_mobile)),
        audio: if inputs.include_system_audio {
            Some(audio_constraints(None, audio))
        } else {
            None
        },
    }
}
