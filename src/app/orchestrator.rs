use super::types::StudioSettings;
use crate::config::PromptcapConfig;
use crate::devices::DeviceCatalog;
use crate::error::Result;
use crate::events::EventBus;
use crate::export::{ExportCoordinator, FileExporter};
#[cfg(feature = "keyboard")]
use crate::keyboard_input::KeyboardInputHandler;
use crate::media::DeviceRegistry;
use crate::negotiator::StreamNegotiator;
use crate::platform::{
    MediaPlatform, OverlayCompositor, PreviewSink, RecorderBackend, SimulatedOverlay,
    SimulatedPlatform, SimulatedPreviewSink, SimulatedRecorder,
};
use crate::preview::PreviewController;
use crate::recorder::CaptureSessionManager;
use crate::teleprompter::Teleprompter;
use crate::timeline::TimelineModel;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Platform capabilities the studio runs against
#[derive(Clone)]
pub struct StudioBackends {
    pub platform: Arc<dyn MediaPlatform>,
    pub recorder: Arc<dyn RecorderBackend>,
    pub compositor: Arc<dyn OverlayCompositor>,
    pub preview_sink: Arc<dyn PreviewSink>,
}

impl StudioBackends {
    /// Fully simulated devices, recorder and surfaces
    pub fn simulated() -> Self {
        Self {
            platform: Arc::new(SimulatedPlatform::new()),
            recorder: Arc::new(SimulatedRecorder::new()),
            compositor: Arc::new(SimulatedOverlay::new()),
            preview_sink: Arc::new(SimulatedPreviewSink::new()),
        }
    }
}

/// Application coordinator behind the UI command surface
///
/// Owns every component and wires them to one event bus. Commands live in
/// `commands.rs`, the event loop in `runtime.rs`.
pub struct Studio {
    pub(super) config: PromptcapConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) catalog: Arc<DeviceCatalog>,
    pub(super) negotiator: Arc<StreamNegotiator>,
    pub(super) preview: Arc<PreviewController>,
    pub(super) capture: Arc<CaptureSessionManager>,
    pub(super) timeline: Mutex<TimelineModel>,
    pub(super) exporter: Arc<dyn ExportCoordinator>,
    pub(super) settings: Mutex<StudioSettings>,
    pub(super) teleprompter: Mutex<Option<Teleprompter>>,
    #[cfg(feature = "keyboard")]
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) cancellation_token: CancellationToken,
}

impl Studio {
    pub fn new(config: PromptcapConfig, backends: StudioBackends) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let catalog = Arc::new(DeviceCatalog::new(
            Arc::clone(&backends.platform),
            Arc::clone(&event_bus),
        ));
        let negotiator = Arc::new(StreamNegotiator::new(
            Arc::clone(&backends.platform),
            DeviceRegistry::new(),
            &config,
            Arc::clone(&event_bus),
        ));
        let preview = Arc::new(PreviewController::new(
            backends.preview_sink,
            Arc::clone(&negotiator),
            Arc::clone(&event_bus),
        ));
        let capture = Arc::new(CaptureSessionManager::new(
            Arc::clone(&negotiator),
            backends.recorder,
            backends.compositor,
            &config,
            Arc::clone(&event_bus),
        ));
        let exporter: Arc<dyn ExportCoordinator> =
            Arc::new(FileExporter::new(&config.export, Arc::clone(&event_bus)));
        let timeline = TimelineModel::new(config.timeline.max_history);

        info!(
            "Studio ready (fragments every {:?}, {} undo steps)",
            config.capture.fragment_interval(),
            config.timeline.max_history
        );

        Ok(Self {
            config,
            event_bus,
            catalog,
            negotiator,
            preview,
            capture,
            timeline: Mutex::new(timeline),
            exporter,
            settings: Mutex::new(StudioSettings::default()),
            teleprompter: Mutex::new(None),
            #[cfg(feature = "keyboard")]
            keyboard_handler: None,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Replace the file exporter, e.g. with a transcoding service
    pub fn with_exporter(mut self, exporter: Arc<dyn ExportCoordinator>) -> Self {
        self.exporter = exporter;
        self
    }

    /// Listen for `s`/`q` in the terminal while the loop runs
    #[cfg(feature = "keyboard")]
    pub fn enable_keyboard(&mut self) {
        self.keyboard_handler = Some(KeyboardInputHandler::new(Arc::clone(&self.event_bus)));
    }

    pub fn config(&self) -> &PromptcapConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn catalog(&self) -> &Arc<DeviceCatalog> {
        &self.catalog
    }

    pub fn negotiator(&self) -> &Arc<StreamNegotiator> {
        &self.negotiator
    }

    pub fn preview(&self) -> &Arc<PreviewController> {
        &self.preview
    }

    pub fn capture(&self) -> &Arc<CaptureSessionManager> {
        &self.capture
    }

    pub fn settings(&self) -> StudioSettings {
        self.settings.lock().clone()
    }
}
