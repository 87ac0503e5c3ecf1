//! In-process platform used by tests and by the CLI.
//!
//! Everything is deterministic apart from recorder timing, and every piece
//! exposes hooks to inject failures or observe what the core did with it.

use super::{
    MediaPlatform, MediaTrack, OverlayCompositor, OverlayId, OverlayPlacement, PermissionState,
    PreviewSink, RecorderBackend, RecorderControl, RecorderEvent, RecorderHandle, RecorderOptions,
    TrackSettings,
};
use crate::error::{AcquisitionError, PromptcapError, RecorderError, Result, SessionError};
use crate::media::{
    CaptureConstraints, CaptureDevice, ConstraintValue, DisplayConstraints, MediaKind,
    Orientation, Resolution, TrackSource,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// A track whose lifecycle is driven by the test or the simulated platform
#[derive(Debug)]
pub struct SimulatedTrack {
    id: String,
    kind: MediaKind,
    source: TrackSource,
    label: String,
    settings: TrackSettings,
    stopped: AtomicBool,
    ended: watch::Sender<bool>,
}

impl SimulatedTrack {
    pub fn new(
        kind: MediaKind,
        source: TrackSource,
        label: impl Into<String>,
        settings: TrackSettings,
    ) -> Arc<Self> {
        let (ended, _) = watch::channel(false);
        Arc::new(Self {
            id: format!("track-{}", NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            source,
            label: label.into(),
            settings,
            stopped: AtomicBool::new(false),
            ended,
        })
    }

    /// End the track from the platform side, as if the user revoked it
    pub fn end(&self) {
        if self.stopped.load(Ordering::SeqCst) || *self.ended.borrow() {
            return;
        }
        info!("Platform ended {} track {} ({})", self.kind, self.id, self.source);
        self.ended.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of listeners still watching for the ended signal
    pub fn end_listener_count(&self) -> usize {
        self.ended.receiver_count()
    }
}

impl MediaTrack for SimulatedTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn source(&self) -> &TrackSource {
        &self.source
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && !*self.ended.borrow()
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            trace!("Stopped track {} ({})", self.id, self.source);
        }
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended.subscribe()
    }
}

struct PlatformState {
    devices: Vec<CaptureDevice>,
    permissions: HashMap<MediaKind, PermissionState>,
    prompt_response: PermissionState,
    display_supported: bool,
    max_resolution: Resolution,
    user_media_failure: Option<AcquisitionError>,
    display_media_failure: Option<AcquisitionError>,
    enumerate_failure: Option<AcquisitionError>,
    acquisition_delay: Duration,
    forced_orientation: Option<Orientation>,
    issued: Vec<Arc<SimulatedTrack>>,
}

impl PlatformState {
    fn ensure_permission(&mut self, kind: MediaKind) -> std::result::Result<(), AcquisitionError> {
        let current = self
            .permissions
            .get(&kind)
            .copied()
            .unwrap_or(PermissionState::Prompt);
        let resolved = match current {
            PermissionState::Prompt => {
                self.permissions.insert(kind, self.prompt_response);
                self.prompt_response
            }
            other => other,
        };
        match resolved {
            PermissionState::Granted => Ok(()),
            _ => Err(AcquisitionError::PermissionDenied { kind }),
        }
    }

    fn pick_device(
        &self,
        kind: MediaKind,
        device_id: Option<&str>,
    ) -> std::result::Result<CaptureDevice, AcquisitionError> {
        let mut candidates = self.devices.iter().filter(|d| d.kind == kind);
        let found = match device_id {
            Some(id) => candidates.find(|d| d.id == id),
            None => {
                let all: Vec<&CaptureDevice> = candidates.collect();
                all.iter()
                    .find(|d| d.is_default)
                    .or_else(|| all.first())
                    .copied()
            }
        };
        found.cloned().ok_or_else(|| AcquisitionError::DeviceUnavailable {
            device_id: device_id.map(str::to_string),
            details: format!("no matching {} device", kind),
        })
    }

    fn check_dimension(
        &self,
        name: &str,
        value: &ConstraintValue<u32>,
    ) -> std::result::Result<(), AcquisitionError> {
        let limit = self.max_resolution.width.max(self.max_resolution.height);
        if let ConstraintValue::Exact(v) = value {
            if *v == 0 || *v > limit {
                return Err(AcquisitionError::ConstraintUnsatisfiable {
                    constraint: name.to_string(),
                    details: format!("exact {} outside 1..={}", v, limit),
                });
            }
        }
        Ok(())
    }
}

/// Simulated device layer with hot-plug and failure injection
pub struct SimulatedPlatform {
    state: Mutex<PlatformState>,
    changes: broadcast::Sender<()>,
}

impl SimulatedPlatform {
    /// Two cameras and two microphones, access already granted
    pub fn new() -> Self {
        Self::with_devices(vec![
            CaptureDevice::new("cam-front", MediaKind::Video, "Front Camera", true),
            CaptureDevice::new("cam-usb", MediaKind::Video, "USB Camera", false),
            CaptureDevice::new("mic-builtin", MediaKind::Audio, "Built-in Microphone", true),
            CaptureDevice::new("mic-usb", MediaKind::Audio, "USB Microphone", false),
        ])
    }

    pub fn with_devices(devices: Vec<CaptureDevice>) -> Self {
        let (changes, _) = broadcast::channel(16);
        let permissions = [
            (MediaKind::Video, PermissionState::Granted),
            (MediaKind::Audio, PermissionState::Granted),
        ]
        .into_iter()
        .collect();

        Self {
            state: Mutex::new(PlatformState {
                devices,
                permissions,
                prompt_response: PermissionState::Granted,
                display_supported: true,
                max_resolution: Resolution::new(1920, 1080),
                user_media_failure: None,
                display_media_failure: None,
                enumerate_failure: None,
                acquisition_delay: Duration::ZERO,
                forced_orientation: None,
                issued: Vec::new(),
            }),
            changes,
        }
    }

    pub fn set_permission(&self, kind: MediaKind, state: PermissionState) {
        self.state.lock().permissions.insert(kind, state);
    }

    /// What the user answers when prompted
    pub fn set_prompt_response(&self, response: PermissionState) {
        self.state.lock().prompt_response = response;
    }

    pub fn set_display_supported(&self, supported: bool) {
        self.state.lock().display_supported = supported;
    }

    pub fn fail_user_media(&self, error: Option<AcquisitionError>) {
        self.state.lock().user_media_failure = error;
    }

    pub fn fail_display_media(&self, error: Option<AcquisitionError>) {
        self.state.lock().display_media_failure = error;
    }

    pub fn fail_enumeration(&self, error: Option<AcquisitionError>) {
        self.state.lock().enumerate_failure = error;
    }

    /// Delay every acquisition, leaving room to cancel mid-flight
    pub fn set_acquisition_delay(&self, delay: Duration) {
        self.state.lock().acquisition_delay = delay;
    }

    /// Deliver camera streams in this orientation whatever was requested
    pub fn force_orientation(&self, orientation: Option<Orientation>) {
        self.state.lock().forced_orientation = orientation;
    }

    pub fn plug_device(&self, device: CaptureDevice) {
        info!("Device plugged: {} ({})", device.label, device.id);
        self.state.lock().devices.push(device);
        let _ = self.changes.send(());
    }

    pub fn unplug_device(&self, device_id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let before = state.devices.len();
            state.devices.retain(|d| d.id != device_id);
            let removed = state.devices.len() != before;
            if removed {
                for track in state.issued.iter() {
                    if track.source.device_id() == Some(device_id) {
                        track.end();
                    }
                }
            }
            removed
        };
        if removed {
            info!("Device unplugged: {}", device_id);
            let _ = self.changes.send(());
        }
        removed
    }

    /// End every live display track, as if sharing was stopped from the system UI
    pub fn end_display_capture(&self) -> usize {
        let tracks: Vec<Arc<SimulatedTrack>> = self
            .state
            .lock()
            .issued
            .iter()
            .filter(|t| t.source == TrackSource::Display && t.is_live())
            .cloned()
            .collect();
        for track in &tracks {
            track.end();
        }
        tracks.len()
    }

    pub fn issued_tracks(&self) -> Vec<Arc<SimulatedTrack>> {
        self.state.lock().issued.clone()
    }

    pub fn live_tracks(&self) -> Vec<Arc<SimulatedTrack>> {
        self.state
            .lock()
            .issued
            .iter()
            .filter(|t| t.is_live())
            .cloned()
            .collect()
    }

    async fn simulate_latency(&self) {
        let delay = self.state.lock().acquisition_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn issue(state: &mut PlatformState, tracks: Vec<Arc<SimulatedTrack>>) -> Vec<Arc<dyn MediaTrack>> {
        state.issued.extend(tracks.iter().cloned());
        tracks
            .into_iter()
            .map(|t| t as Arc<dyn MediaTrack>)
            .collect()
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaPlatform for SimulatedPlatform {
    async fn enumerate_devices(&self) -> std::result::Result<Vec<CaptureDevice>, AcquisitionError> {
        let state = self.state.lock();
        if let Some(err) = state.enumerate_failure.clone() {
            return Err(err);
        }

        // Unauthorized kinds are reported without ids or labels
        Ok(state
            .devices
            .iter()
            .map(|d| {
                let granted = state.permissions.get(&d.kind) == Some(&PermissionState::Granted);
                if granted {
                    d.clone()
                } else {
                    CaptureDevice::new("", d.kind, "", d.is_default)
                }
            })
            .collect())
    }

    fn permission(&self, kind: MediaKind) -> PermissionState {
        self.state
            .lock()
            .permissions
            .get(&kind)
            .copied()
            .unwrap_or(PermissionState::Prompt)
    }

    async fn request_permission(
        &self,
        kind: MediaKind,
    ) -> std::result::Result<PermissionState, AcquisitionError> {
        let mut state = self.state.lock();
        let current = state
            .permissions
            .get(&kind)
            .copied()
            .unwrap_or(PermissionState::Prompt);
        if current != PermissionState::Prompt {
            return Ok(current);
        }
        let response = state.prompt_response;
        state.permissions.insert(kind, response);
        debug!("Permission prompt for {} answered: {:?}", kind, response);
        Ok(response)
    }

    async fn get_user_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<Vec<Arc<dyn MediaTrack>>, AcquisitionError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        if let Some(err) = state.user_media_failure.clone() {
            return Err(err);
        }

        let mut tracks = Vec::new();

        if let Some(video) = &constraints.video {
            state.ensure_permission(MediaKind::Video)?;
            let device = state.pick_device(MediaKind::Video, constraints.video_device_id())?;
            state.check_dimension("width", &video.width)?;
            state.check_dimension("height", &video.height)?;

            let requested = Resolution::new(
                video.width.target().unwrap_or(1280),
                video.height.target().unwrap_or(720),
            );
            let delivered = match state.forced_orientation {
                Some(o) => Resolution::for_orientation((requested.width, requested.height), o),
                None => requested,
            };

            tracks.push(SimulatedTrack::new(
                MediaKind::Video,
                TrackSource::device(MediaKind::Video, device.id.as_str()),
                device.label.as_str(),
                TrackSettings {
                    device_id: Some(device.id.clone()),
                    width: Some(delivered.width),
                    height: Some(delivered.height),
                    frame_rate: video.frame_rate.target(),
                    sample_rate: None,
                },
            ));
        }

        if let Some(audio) = &constraints.audio {
            state.ensure_permission(MediaKind::Audio)?;
            let device = state.pick_device(MediaKind::Audio, constraints.audio_device_id())?;
            tracks.push(SimulatedTrack::new(
                MediaKind::Audio,
                TrackSource::device(MediaKind::Audio, device.id.as_str()),
                device.label.as_str(),
                TrackSettings {
                    device_id: Some(device.id.clone()),
                    sample_rate: audio.sample_rate.target(),
                    ..TrackSettings::default()
                },
            ));
        }

        Ok(Self::issue(&mut state, tracks))
    }

    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> std::result::Result<Vec<Arc<dyn MediaTrack>>, AcquisitionError> {
        if !self.supports_display_capture() {
            return Err(AcquisitionError::PlatformUnsupported {
                feature: "display capture".to_string(),
            });
        }

        self.simulate_latency().await;

        let mut state = self.state.lock();
        if let Some(err) = state.display_media_failure.clone() {
            return Err(err);
        }

        let mut tracks = vec![SimulatedTrack::new(
            MediaKind::Video,
            TrackSource::Display,
            "Entire Screen",
            TrackSettings {
                width: constraints.width.target(),
                height: constraints.height.target(),
                frame_rate: constraints.frame_rate.target(),
                ..TrackSettings::default()
            },
        )];
        if let Some(audio) = &constraints.audio {
            tracks.push(SimulatedTrack::new(
                MediaKind::Audio,
                TrackSource::Display,
                "System Audio",
                TrackSettings {
                    sample_rate: audio.sample_rate.target(),
                    ..TrackSettings::default()
                },
            ));
        }

        Ok(Self::issue(&mut state, tracks))
    }

    fn supports_display_capture(&self) -> bool {
        self.state.lock().display_supported
    }

    fn device_changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

/// Recorder that emits a small text fragment per timeslice
pub struct SimulatedRecorder {
    supported: Vec<String>,
    start_failure: Mutex<Option<RecorderError>>,
    fail_after: Mutex<Option<usize>>,
    started: AtomicUsize,
    last_options: Mutex<Option<RecorderOptions>>,
    last_track_ids: Mutex<Vec<String>>,
}

impl SimulatedRecorder {
    pub fn new() -> Self {
        Self::with_supported_types(vec![
            "video/webm;codecs=vp9,opus".to_string(),
            "video/webm;codecs=vp8,opus".to_string(),
            "video/webm".to_string(),
        ])
    }

    pub fn with_supported_types(supported: Vec<String>) -> Self {
        Self {
            supported,
            start_failure: Mutex::new(None),
            fail_after: Mutex::new(None),
            started: AtomicUsize::new(0),
            last_options: Mutex::new(None),
            last_track_ids: Mutex::new(Vec::new()),
        }
    }

    /// A recorder that supports no container at all
    pub fn unsupported() -> Self {
        Self::with_supported_types(Vec::new())
    }

    pub fn fail_start(&self, error: Option<RecorderError>) {
        *self.start_failure.lock() = error;
    }

    /// Emit an error instead of the fragment with this index
    pub fn fail_after_fragments(&self, count: Option<usize>) {
        *self.fail_after.lock() = count;
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<RecorderOptions> {
        self.last_options.lock().clone()
    }

    /// Ids of the tracks handed to the most recent recording
    pub fn recorded_track_ids(&self) -> Vec<String> {
        self.last_track_ids.lock().clone()
    }
}

impl Default for SimulatedRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderBackend for SimulatedRecorder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|t| t == mime_type)
    }

    fn start(
        &self,
        tracks: Vec<Arc<dyn MediaTrack>>,
        options: RecorderOptions,
    ) -> std::result::Result<RecorderHandle, RecorderError> {
        if let Some(err) = self.start_failure.lock().clone() {
            return Err(err);
        }
        if tracks.is_empty() {
            return Err(RecorderError::StartFailed {
                details: "no tracks to record".to_string(),
            });
        }
        if !self.is_type_supported(&options.mime_type) {
            return Err(RecorderError::Unsupported {
                details: format!("{} is not supported", options.mime_type),
            });
        }

        *self.last_track_ids.lock() = tracks.iter().map(|t| t.id().to_string()).collect();
        *self.last_options.lock() = Some(options.clone());
        self.started.fetch_add(1, Ordering::SeqCst);

        let (events, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let fail_after = *self.fail_after.lock();

        debug!(
            "Simulated recorder started: {} tracks, {} every {:?}",
            tracks.len(),
            options.mime_type,
            options.timeslice
        );
        tokio::spawn(run_recorder(events, stop.clone(), options.timeslice, fail_after));

        Ok(RecorderHandle {
            events: rx,
            control: Box::new(SimulatedRecorderControl { stop }),
        })
    }
}

async fn run_recorder(
    events: mpsc::UnboundedSender<RecorderEvent>,
    stop: CancellationToken,
    timeslice: Duration,
    fail_after: Option<usize>,
) {
    let mut ticker = tokio::time::interval(timeslice);
    // The first tick completes immediately
    ticker.tick().await;

    let mut index = 0usize;
    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => {
                let _ = events.send(RecorderEvent::Data(Bytes::from(format!("fragment-{};", index))));
                let _ = events.send(RecorderEvent::Stopped);
                break;
            }
            _ = ticker.tick() => {
                if fail_after == Some(index) {
                    warn!("Simulated recorder failing after {} fragments", index);
                    let _ = events.send(RecorderEvent::Error(RecorderError::Failed {
                        details: "simulated encoder failure".to_string(),
                    }));
                    break;
                }
                let fragment = Bytes::from(format!("fragment-{};", index));
                if events.send(RecorderEvent::Data(fragment)).is_err() {
                    break;
                }
                index += 1;
            }
        }
    }
}

struct SimulatedRecorderControl {
    stop: CancellationToken,
}

impl RecorderControl for SimulatedRecorderControl {
    fn request_stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for SimulatedRecorderControl {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MountedOverlay {
    SelfView {
        track_id: String,
        placement: OverlayPlacement,
    },
    StopControl,
}

/// Compositor that records what is mounted
#[derive(Default)]
pub struct SimulatedOverlay {
    next_id: AtomicU64,
    mounted: Mutex<HashMap<OverlayId, MountedOverlay>>,
    stop_controls: Mutex<HashMap<OverlayId, CancellationToken>>,
    fail_stop_control: AtomicBool,
}

impl SimulatedOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_stop_control(&self, fail: bool) {
        self.fail_stop_control.store(fail, Ordering::SeqCst);
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.lock().len()
    }

    pub fn mounted(&self) -> Vec<MountedOverlay> {
        self.mounted.lock().values().cloned().collect()
    }

    /// Press every mounted stop control; returns false if none is mounted
    pub fn click_stop_control(&self) -> bool {
        let controls = self.stop_controls.lock();
        for token in controls.values() {
            token.cancel();
        }
        !controls.is_empty()
    }

    fn next_id(&self) -> OverlayId {
        OverlayId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl OverlayCompositor for SimulatedOverlay {
    fn mount_self_view(
        &self,
        track: Arc<dyn MediaTrack>,
        placement: &OverlayPlacement,
    ) -> std::result::Result<OverlayId, SessionError> {
        let id = self.next_id();
        self.mounted.lock().insert(
            id,
            MountedOverlay::SelfView {
                track_id: track.id().to_string(),
                placement: placement.clone(),
            },
        );
        debug!("Mounted self-view {} for track {}", id, track.id());
        Ok(id)
    }

    fn mount_stop_control(
        &self,
        on_stop: CancellationToken,
    ) -> std::result::Result<OverlayId, SessionError> {
        if self.fail_stop_control.load(Ordering::SeqCst) {
            return Err(SessionError::Overlay {
                details: "stop control could not be placed above other windows".to_string(),
            });
        }
        let id = self.next_id();
        self.mounted.lock().insert(id, MountedOverlay::StopControl);
        self.stop_controls.lock().insert(id, on_stop);
        debug!("Mounted stop control {}", id);
        Ok(id)
    }

    fn unmount(&self, id: OverlayId) {
        self.stop_controls.lock().remove(&id);
        if self.mounted.lock().remove(&id).is_some() {
            debug!("Unmounted {}", id);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewSinkState {
    pub session_id: Option<Uuid>,
    pub track_ids: Vec<String>,
    pub muted: bool,
    pub playing: bool,
    pub attach_count: usize,
}

/// Preview surface that records what it was asked to show
#[derive(Default)]
pub struct SimulatedPreviewSink {
    state: Mutex<PreviewSinkState>,
    block_playback: AtomicBool,
}

impl SimulatedPreviewSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject play() the way autoplay policies do
    pub fn block_playback(&self, block: bool) {
        self.block_playback.store(block, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PreviewSinkState {
        self.state.lock().clone()
    }
}

impl PreviewSink for SimulatedPreviewSink {
    fn attach(&self, session_id: Uuid, tracks: &[Arc<dyn MediaTrack>]) {
        let mut state = self.state.lock();
        state.session_id = Some(session_id);
        state.track_ids = tracks.iter().map(|t| t.id().to_string()).collect();
        state.playing = false;
        state.attach_count += 1;
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn play(&self) -> Result<()> {
        if self.block_playback.load(Ordering::SeqCst) {
            return Err(PromptcapError::component("preview", "playback was blocked"));
        }
        self.state.lock().playing = true;
        Ok(())
    }

    fn detach(&self) {
        let mut state = self.state.lock();
        state.session_id = None;
        state.track_ids.clear();
        state.playing = false;
    }
}
