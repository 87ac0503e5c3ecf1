use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptcapConfig {
    pub camera: CameraConfig,
    pub audio: AudioConfig,
    pub capture: CaptureConfig,
    pub overlay: OverlayConfig,
    pub timeline: TimelineConfig,
    pub teleprompter: TeleprompterConfig,
    pub export: ExportConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Landscape base resolution (width, height); portrait swaps the axes
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second on desktop
    #[serde(default = "default_camera_frame_rate")]
    pub frame_rate: u32,

    /// Frames per second on constrained/mobile environments
    #[serde(default = "default_mobile_frame_rate")]
    pub mobile_frame_rate: u32,

    /// Lower bound used when no device or resolution is chosen explicitly
    #[serde(default = "default_min_resolution")]
    pub min_resolution: (u32, u32),

    /// Upper bound used when no device or resolution is chosen explicitly
    #[serde(default = "default_max_resolution")]
    pub max_resolution: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AudioConfig {
    /// Capture microphone audio alongside camera video
    #[serde(default = "default_audio_enabled")]
    pub enabled: bool,

    #[serde(default = "default_echo_cancellation")]
    pub echo_cancellation: bool,

    #[serde(default = "default_noise_suppression")]
    pub noise_suppression: bool,

    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Recorder fragment interval in milliseconds
    #[serde(default = "default_fragment_interval_ms")]
    pub fragment_interval_ms: u64,

    /// Fragment interval on constrained/mobile environments
    #[serde(default = "default_mobile_fragment_interval_ms")]
    pub mobile_fragment_interval_ms: u64,

    /// Container MIME types in order of preference
    #[serde(default = "default_mime_types")]
    pub mime_types: Vec<String>,

    /// Treat the environment as constrained (mobile)
    #[serde(default)]
    pub is_mobile: bool,

    /// Request system audio with screen capture
    #[serde(default)]
    pub include_system_audio: bool,
}

impl CaptureConfig {
    /// Fragment cadence for the current environment
    pub fn fragment_interval(&self) -> Duration {
        if self.is_mobile {
            Duration::from_millis(self.mobile_fragment_interval_ms)
        } else {
            Duration::from_millis(self.fragment_interval_ms)
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OverlayConfig {
    /// Self-view diameter in pixels
    #[serde(default = "default_self_view_size")]
    pub self_view_size: u32,

    /// Distance from the screen edge in pixels
    #[serde(default = "default_overlay_margin")]
    pub margin: u32,

    #[serde(default)]
    pub corner: OverlayCorner,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayCorner {
    TopLeft,
    TopRight,
    #[default]
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimelineConfig {
    /// Maximum number of undo snapshots kept
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TeleprompterConfig {
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportConfig {
    /// Directory finished recordings are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Write a JSON edit list next to edited recordings
    #[serde(default = "default_write_edit_list")]
    pub write_edit_list: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl PromptcapConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("promptcap.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.frame_rate", default_camera_frame_rate())?
            .set_default("camera.mobile_frame_rate", default_mobile_frame_rate())?
            .set_default(
                "camera.min_resolution",
                vec![default_min_resolution().0, default_min_resolution().1],
            )?
            .set_default(
                "camera.max_resolution",
                vec![default_max_resolution().0, default_max_resolution().1],
            )?
            .set_default("audio.enabled", default_audio_enabled())?
            .set_default("audio.echo_cancellation", default_echo_cancellation())?
            .set_default("audio.noise_suppression", default_noise_suppression())?
            .set_default("audio.sample_rate", default_sample_rate())?
            .set_default(
                "capture.fragment_interval_ms",
                default_fragment_interval_ms() as i64,
            )?
            .set_default(
                "capture.mobile_fragment_interval_ms",
                default_mobile_fragment_interval_ms() as i64,
            )?
            .set_default("capture.mime_types", default_mime_types())?
            .set_default("capture.is_mobile", false)?
            .set_default("capture.include_system_audio", false)?
            .set_default("overlay.self_view_size", default_self_view_size())?
            .set_default("overlay.margin", default_overlay_margin())?
            .set_default("overlay.corner", "BottomLeft")?
            .set_default("timeline.max_history", default_max_history() as i64)?
            .set_default(
                "teleprompter.words_per_minute",
                default_words_per_minute(),
            )?
            .set_default("export.output_dir", default_output_dir())?
            .set_default("export.write_edit_list", default_write_edit_list())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("PROMPTCAP").separator("_"))
            .build()?;

        let config: PromptcapConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.frame_rate == 0 || self.camera.mobile_frame_rate == 0 {
            return Err(ConfigError::Message(
                "Camera frame rates must be greater than 0".to_string(),
            ));
        }

        let (min, max) = (self.camera.min_resolution, self.camera.max_resolution);
        if min.0 > max.0 || min.1 > max.1 {
            return Err(ConfigError::Message(
                "Camera min_resolution must not exceed max_resolution".to_string(),
            ));
        }

        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Message(
                "Audio sample_rate must be greater than 0".to_string(),
            ));
        }

        if self.capture.fragment_interval_ms == 0 || self.capture.mobile_fragment_interval_ms == 0
        {
            return Err(ConfigError::Message(
                "Fragment intervals must be greater than 0".to_string(),
            ));
        }

        if self.capture.mime_types.is_empty() {
            return Err(ConfigError::Message(
                "At least one recorder MIME type must be configured".to_string(),
            ));
        }

        if self.teleprompter.words_per_minute == 0 {
            return Err(ConfigError::Message(
                "Teleprompter words_per_minute must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PromptcapConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                resolution: default_camera_resolution(),
                frame_rate: default_camera_frame_rate(),
                mobile_frame_rate: default_mobile_frame_rate(),
                min_resolution: default_min_resolution(),
                max_resolution: default_max_resolution(),
            },
            audio: AudioConfig {
                enabled: default_audio_enabled(),
                echo_cancellation: default_echo_cancellation(),
                noise_suppression: default_noise_suppression(),
                sample_rate: default_sample_rate(),
            },
            capture: CaptureConfig {
                fragment_interval_ms: default_fragment_interval_ms(),
                mobile_fragment_interval_ms: default_mobile_fragment_interval_ms(),
                mime_types: default_mime_types(),
                is_mobile: false,
                include_system_audio: false,
            },
            overlay: OverlayConfig {
                self_view_size: default_self_view_size(),
                margin: default_overlay_margin(),
                corner: OverlayCorner::default(),
            },
            timeline: TimelineConfig {
                max_history: default_max_history(),
            },
            teleprompter: TeleprompterConfig {
                words_per_minute: default_words_per_minute(),
            },
            export: ExportConfig {
                output_dir: default_output_dir(),
                write_edit_list: default_write_edit_list(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_camera_frame_rate() -> u32 {
    30
}
fn default_mobile_frame_rate() -> u32 {
    24
}
fn default_min_resolution() -> (u32, u32) {
    (640, 360)
}
fn default_max_resolution() -> (u32, u32) {
    (1920, 1080)
}

fn default_audio_enabled() -> bool {
    true
}
fn default_echo_cancellation() -> bool {
    true
}
fn default_noise_suppression() -> bool {
    true
}
fn default_sample_rate() -> u32 {
    48_000
}

fn default_fragment_interval_ms() -> u64 {
    1000
}
fn default_mobile_fragment_interval_ms() -> u64 {
    250
}
fn default_mime_types() -> Vec<String> {
    vec![
        "video/webm;codecs=vp9,opus".to_string(),
        "video/webm;codecs=vp8,opus".to_string(),
        "video/webm".to_string(),
        "video/mp4".to_string(),
    ]
}

fn default_self_view_size() -> u32 {
    200
}
fn default_overlay_margin() -> u32 {
    24
}

fn default_max_history() -> usize {
    100
}

fn default_words_per_minute() -> u32 {
    150
}

fn default_output_dir() -> String {
    "./recordings".to_string()
}
fn default_write_edit_list() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PromptcapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.resolution, (1280, 720));
        assert_eq!(config.capture.fragment_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_mobile_fragment_interval() {
        let mut config = PromptcapConfig::default();
        config.capture.is_mobile = true;
        assert_eq!(config.capture.fragment_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PromptcapConfig::default();
        config.camera.resolution = (0, 0);
        assert!(config.validate().is_err());

        config.camera.resolution = (1280, 720);
        config.capture.mime_types.clear();
        assert!(config.validate().is_err());

        config.capture.mime_types = default_mime_types();
        config.camera.min_resolution = (4000, 4000);
        assert!(config.validate().is_err());

        config.camera.min_resolution = default_min_resolution();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[camera]\nframe_rate = 60\n\n[capture]\nfragment_interval_ms = 500\n\n[overlay]\ncorner = \"TopRight\""
        )
        .unwrap();

        let config = PromptcapConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.frame_rate, 60);
        assert_eq!(config.capture.fragment_interval_ms, 500);
        assert_eq!(config.overlay.corner, OverlayCorner::TopRight);
        // untouched sections keep their defaults
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.timeline.max_history, 100);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = PromptcapConfig::load_from_file("/nonexistent/promptcap.toml").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.mime_types.len(), 4);
    }
}
