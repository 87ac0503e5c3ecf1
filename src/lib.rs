pub mod app;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod export;
#[cfg(feature = "keyboard")]
pub mod keyboard_input;
pub mod media;
pub mod negotiator;
pub mod platform;
pub mod preview;
pub mod recorder;
pub mod teleprompter;
pub mod timeline;

pub use app::{ShutdownReason, Studio, StudioBackends, StudioSettings, StudioSnapshot};
pub use config::PromptcapConfig;
pub use devices::{DeviceCatalog, DeviceListing};
pub use error::{PromptcapError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, PromptcapEvent};
pub use export::{EditList, ExportCoordinator, ExportOutput, FileExporter};
pub use media::{
    CaptureDevice, DeviceRegistry, MediaKind, MediaSession, Orientation, OwnerToken,
    RecordingMode, Resolution,
};
pub use negotiator::{AcquiredStreams, StreamNegotiator, StreamRequest};
pub use preview::PreviewController;
pub use recorder::{Artifact, CaptureSessionManager, SessionState};
pub use teleprompter::{Teleprompter, TeleprompterState};
pub use timeline::{Layer, TimelineClip, TimelineModel};
