use super::listener::TrackEndListener;
use super::overlay::OverlayGuard;
use super::state::{Artifact, RecordingSession, SessionState};
use crate::config::{CaptureConfig, PromptcapConfig};
use crate::error::{PromptcapError, RecorderError, Result, SessionError};
use crate::events::{EventBus, PromptcapEvent};
use crate::media::{OwnerRole, OwnerToken, RecordingMode};
use crate::negotiator::{AcquiredStreams, StreamNegotiator, StreamRequest};
use crate::platform::{
    MediaTrack, OverlayCompositor, OverlayPlacement, RecorderBackend, RecorderEvent,
    RecorderHandle, RecorderOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

type Outcome = Option<std::result::Result<Artifact, SessionError>>;

#[derive(Default)]
struct ManagerState {
    state: SessionState,
    session_id: Option<Uuid>,
    mode: Option<RecordingMode>,
    cancel_acquire: Option<CancellationToken>,
    stop: Option<CancellationToken>,
    completion: Option<watch::Receiver<Outcome>>,
    driver: Option<JoinHandle<()>>,
    last_artifact: Option<Artifact>,
    last_error: Option<String>,
}

/// The recording state machine
///
/// Drives at most one recording at a time. Each live recording is owned by a
/// driver task that appends fragments in emission order and runs cleanup on
/// every exit path.
pub struct CaptureSessionManager {
    negotiator: Arc<StreamNegotiator>,
    recorder: Arc<dyn RecorderBackend>,
    compositor: Arc<dyn OverlayCompositor>,
    event_bus: Arc<EventBus>,
    capture: CaptureConfig,
    placement: OverlayPlacement,
    owner: OwnerToken,
    inner: Arc<Mutex<ManagerState>>,
}

/// Everything a live recording owns until it finalizes
struct Driver {
    session: RecordingSession,
    recorder: RecorderHandle,
    streams: AcquiredStreams,
    overlay: Option<OverlayGuard>,
    end_listener: Option<TrackEndListener>,
    stop: CancellationToken,
    started: Instant,
    event_bus: Arc<EventBus>,
    inner: Arc<Mutex<ManagerState>>,
    done: watch::Sender<Outcome>,
}

impl CaptureSessionManager {
    pub fn new(
        negotiator: Arc<StreamNegotiator>,
        recorder: Arc<dyn RecorderBackend>,
        compositor: Arc<dyn OverlayCompositor>,
        config: &PromptcapConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            negotiator,
            recorder,
            compositor,
            event_bus,
            capture: config.capture.clone(),
            placement: OverlayPlacement::from(&config.overlay),
            owner: OwnerToken::new(OwnerRole::Capture),
            inner: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock().session_id
    }

    pub fn mode(&self) -> Option<RecordingMode> {
        self.inner.lock().mode
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    /// Artifact of the most recent completed recording
    pub fn last_artifact(&self) -> Option<Artifact> {
        self.inner.lock().last_artifact.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// First configured container the recorder supports
    pub fn select_mime_type(&self) -> std::result::Result<String, RecorderError> {
        self.capture
            .mime_types
            .iter()
            .find(|mime| self.recorder.is_type_supported(mime))
            .cloned()
            .ok_or_else(|| RecorderError::Unsupported {
                details: format!(
                    "none of {} is supported by the recorder",
                    self.capture.mime_types.join(", ")
                ),
            })
    }

    /// Start recording `request.mode`
    ///
    /// Returns once the recording is live. On failure every partially
    /// acquired stream and overlay is released before the error is returned.
    pub async fn start(&self, request: StreamRequest) -> Result<Uuid> {
        let current = self.state();
        if !current.can_start() {
            return Err(SessionError::InvalidTransition {
                from: current,
                action: "start",
            }
            .into());
        }

        let mime_type = match self.select_mime_type() {
            Ok(mime) => mime,
            Err(e) => {
                let err = PromptcapError::from(e);
                self.report_failure(None, &err).await;
                return Err(err);
            }
        };

        let mut session = RecordingSession::new(request.mode, mime_type);
        session.transition(SessionState::Acquiring, "start")?;
        let cancel = CancellationToken::new();

        {
            let mut inner = self.inner.lock();
            if !inner.state.can_start() {
                return Err(SessionError::InvalidTransition {
                    from: inner.state,
                    action: "start",
                }
                .into());
            }
            inner.state = SessionState::Acquiring;
            inner.session_id = Some(session.id());
            inner.mode = Some(request.mode);
            inner.cancel_acquire = Some(cancel.clone());
            inner.stop = None;
            inner.completion = None;
            inner.last_error = None;
        }

        info!(
            "Starting {} recording {} as {}",
            request.mode,
            session.id(),
            session.mime_type()
        );
        self.publish_state(Some(session.id()), SessionState::Acquiring)
            .await;

        let acquired = self
            .negotiator
            .acquire_cancellable(&self.owner, &request, &cancel)
            .await;

        let streams = match acquired {
            Ok(streams) if !cancel.is_cancelled() => streams,
            Ok(streams) => {
                streams.release();
                return Err(self.abandon(session).await);
            }
            Err(PromptcapError::Session(SessionError::Cancelled)) => {
                return Err(self.abandon(session).await);
            }
            Err(e) => {
                self.fail(session, &e).await;
                return Err(e);
            }
        };

        match self.go_live(session, streams, &cancel) {
            Ok(driver) => {
                let session_id = driver.session.id();
                self.publish_state(Some(session_id), SessionState::Live).await;
                self.inner.lock().driver = Some(tokio::spawn(driver.run()));
                Ok(session_id)
            }
            Err((session, PromptcapError::Session(SessionError::Cancelled))) => {
                Err(self.abandon(session).await)
            }
            Err((session, e)) => {
                self.fail(session, &e).await;
                Err(e)
            }
        }
    }

    /// Mount overlays, register the screen-end listener and start the recorder
    fn go_live(
        &self,
        mut session: RecordingSession,
        streams: AcquiredStreams,
        cancel: &CancellationToken,
    ) -> std::result::Result<Driver, (RecordingSession, PromptcapError)> {
        let mode = session.mode();
        let stop = CancellationToken::new();

        let overlay = if mode == RecordingMode::Combined {
            let self_view = streams
                .camera
                .as_ref()
                .and_then(|camera| camera.video_tracks().into_iter().next());
            match self_view {
                Some(track) => {
                    match OverlayGuard::mount(
                        Arc::clone(&self.compositor),
                        track,
                        &self.placement,
                        stop.clone(),
                    ) {
                        Ok(guard) => Some(guard),
                        Err(e) => {
                            streams.release();
                            return Err((session, e.into()));
                        }
                    }
                }
                None => {
                    streams.release();
                    return Err((
                        session,
                        SessionError::Overlay {
                            details: "no camera video for the self-view".to_string(),
                        }
                        .into(),
                    ));
                }
            }
        } else {
            None
        };
        session.set_overlay(overlay.as_ref().and_then(OverlayGuard::elements));

        let end_listener = streams
            .screen
            .as_ref()
            .and_then(|screen| screen.video_tracks().into_iter().next())
            .map(|track| TrackEndListener::register(&track, stop.clone()));

        let tracks = recorded_tracks(mode, &streams);
        let options = RecorderOptions {
            mime_type: session.mime_type().to_string(),
            timeslice: self.capture.fragment_interval(),
        };
        debug!(
            "Recording {} tracks, fragment every {:?}",
            tracks.len(),
            options.timeslice
        );

        let recorder = match self.recorder.start(tracks, options) {
            Ok(handle) => handle,
            Err(e) => {
                drop(end_listener);
                drop(overlay);
                streams.release();
                return Err((session, e.into()));
            }
        };

        // Checked under the lock so a concurrent stop() sees either
        // Acquiring with the cancel token or Live with the stop token
        let mut inner = self.inner.lock();
        if cancel.is_cancelled() {
            drop(inner);
            drop(recorder);
            drop(end_listener);
            drop(overlay);
            streams.release();
            return Err((session, SessionError::Cancelled.into()));
        }
        if let Err(e) = session.transition(SessionState::Live, "go live") {
            return Err((session, e.into()));
        }

        let (done, completion) = watch::channel(None);
        inner.state = SessionState::Live;
        inner.cancel_acquire = None;
        inner.stop = Some(stop.clone());
        inner.completion = Some(completion);

        Ok(Driver {
            session,
            recorder,
            streams,
            overlay,
            end_listener,
            stop,
            started: Instant::now(),
            event_bus: Arc::clone(&self.event_bus),
            inner: Arc::clone(&self.inner),
            done,
        })
    }

    /// Ask the live recording to stop without waiting for it
    ///
    /// Mid-acquisition this cancels the attempt instead. Returns false when
    /// nothing was running.
    pub fn request_stop(&self, source: &str) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            SessionState::Acquiring => {
                if let Some(cancel) = &inner.cancel_acquire {
                    info!("Cancelling acquisition ({})", source);
                    cancel.cancel();
                }
                true
            }
            SessionState::Live | SessionState::Stopping => {
                if let Some(stop) = &inner.stop {
                    info!("Stop requested by {}", source);
                    stop.cancel();
                }
                true
            }
            _ => false,
        }
    }

    /// Stop the recording and wait for its artifact
    ///
    /// During acquisition the attempt is cancelled and `None` is returned.
    pub async fn stop(&self) -> Result<Option<Artifact>> {
        let completion = {
            let inner = self.inner.lock();
            match inner.state {
                SessionState::Acquiring => {
                    if let Some(cancel) = &inner.cancel_acquire {
                        info!("Stop during acquisition, cancelling");
                        cancel.cancel();
                    }
                    return Ok(None);
                }
                SessionState::Live | SessionState::Stopping => {
                    if let Some(stop) = &inner.stop {
                        stop.cancel();
                    }
                    inner.completion.clone()
                }
                from => {
                    return Err(SessionError::InvalidTransition {
                        from,
                        action: "stop",
                    }
                    .into())
                }
            }
        };

        match completion {
            Some(completion) => wait_for_outcome(completion).await.map(Some),
            None => Ok(None),
        }
    }

    /// Wait for the current recording to finish on its own
    pub async fn wait_for_completion(&self) -> Result<Option<Artifact>> {
        let completion = self.inner.lock().completion.clone();
        match completion {
            Some(completion) => wait_for_outcome(completion).await.map(Some),
            None => Ok(None),
        }
    }

    /// Stop whatever is running and wait for its cleanup
    pub async fn shutdown(&self) {
        let state = self.state();
        if state.is_active() {
            info!("Shutting down capture session in state {}", state);
            if let Err(e) = self.stop().await {
                warn!("Recording did not finalize cleanly during shutdown: {}", e);
            }
        }
        let driver = self.inner.lock().driver.take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                error!("Recording driver task failed: {}", e);
            }
        }
    }

    /// Cancelled acquisition: back to Idle with nothing held
    async fn abandon(&self, mut session: RecordingSession) -> PromptcapError {
        let _ = session.transition(SessionState::Idle, "cancel");
        {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Idle;
            inner.cancel_acquire = None;
        }
        info!("Recording {} cancelled during acquisition", session.id());
        self.publish_state(Some(session.id()), SessionState::Idle)
            .await;
        SessionError::Cancelled.into()
    }

    async fn fail(&self, mut session: RecordingSession, err: &PromptcapError) {
        let _ = session.transition(SessionState::Failed, "fail");
        {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Failed;
            inner.cancel_acquire = None;
            inner.last_error = Some(err.to_string());
        }
        self.publish_state(Some(session.id()), SessionState::Failed)
            .await;
        self.report_failure(Some(session.id()), err).await;
    }

    async fn report_failure(&self, session_id: Option<Uuid>, err: &PromptcapError) {
        error!("Recording failed: {}", err);
        let _ = self
            .event_bus
            .publish(PromptcapEvent::SessionFailed {
                session_id,
                code: err.code(),
                error: err.to_string(),
            })
            .await;
    }

    async fn publish_state(&self, session_id: Option<Uuid>, state: SessionState) {
        publish_state(&self.event_bus, session_id, state).await;
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        if let Some(cancel) = &inner.cancel_acquire {
            cancel.cancel();
        }
        if let Some(stop) = &inner.stop {
            stop.cancel();
        }
    }
}

/// Tracks handed to the recorder for each mode
///
/// Combined mode records the screen with the microphone; the camera video
/// only feeds the self-view overlay.
fn recorded_tracks(mode: RecordingMode, streams: &AcquiredStreams) -> Vec<Arc<dyn MediaTrack>> {
    let camera = streams.camera.as_ref();
    let screen = streams.screen.as_ref();
    match mode {
        RecordingMode::Camera => camera.map(|s| s.tracks().to_vec()).unwrap_or_default(),
        RecordingMode::Screen => screen.map(|s| s.tracks().to_vec()).unwrap_or_default(),
        RecordingMode::Combined => {
            let mut tracks = screen.map(|s| s.tracks().to_vec()).unwrap_or_default();
            if let Some(camera) = camera {
                tracks.extend(camera.audio_tracks());
            }
            tracks
        }
    }
}

async fn publish_state(event_bus: &EventBus, session_id: Option<Uuid>, state: SessionState) {
    let _ = event_bus
        .publish(PromptcapEvent::SessionStateChanged {
            session_id,
            state,
            timestamp: SystemTime::now(),
        })
        .await;
}

async fn wait_for_outcome(mut completion: watch::Receiver<Outcome>) -> Result<Artifact> {
    loop {
        let current = completion.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome.map_err(Into::into);
        }
        if completion.changed().await.is_err() {
            return Err(SessionError::Failed {
                session_id: "unknown".to_string(),
                details: "recording driver exited without an outcome".to_string(),
            }
            .into());
        }
    }
}

impl Driver {
    async fn run(mut self) {
        let session_id = self.session.id();
        let mut stopping = false;

        let result = loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled(), if !stopping => {
                    stopping = true;
                    self.enter(SessionState::Stopping, "stop");
                    publish_state(&self.event_bus, Some(session_id), SessionState::Stopping).await;
                    self.recorder.control.request_stop();
                }
                event = self.recorder.events.recv() => match event {
                    Some(RecorderEvent::Data(chunk)) => {
                        if chunk.is_empty() {
                            trace!("Skipping empty fragment");
                            continue;
                        }
                        let size = chunk.len();
                        let index = self.session.push_chunk(chunk);
                        trace!("Fragment {} ({} bytes) for {}", index, size, session_id);
                        let _ = self
                            .event_bus
                            .publish(PromptcapEvent::FragmentReceived { session_id, index, size })
                            .await;
                    }
                    Some(RecorderEvent::Stopped) => break Ok(()),
                    Some(RecorderEvent::Error(e)) => break Err(e),
                    None => {
                        break Err(RecorderError::Failed {
                            details: "recorder closed without finalizing".to_string(),
                        })
                    }
                },
            }
        };

        self.cleanup().await;

        match result {
            Ok(()) => {
                let artifact = self.session.assemble(self.started.elapsed());
                self.enter(SessionState::Complete, "finalize");
                self.inner.lock().last_artifact = Some(artifact.clone());
                info!(
                    "Recording {} complete: {} fragments, {} bytes over {:.1}s",
                    session_id,
                    artifact.fragment_count,
                    artifact.size(),
                    artifact.duration_secs()
                );
                publish_state(&self.event_bus, Some(session_id), SessionState::Complete).await;
                let _ = self
                    .event_bus
                    .publish(PromptcapEvent::RecordingComplete {
                        artifact: artifact.clone(),
                    })
                    .await;
                self.done.send_replace(Some(Ok(artifact)));
            }
            Err(e) => {
                let err = SessionError::Failed {
                    session_id: session_id.to_string(),
                    details: e.to_string(),
                };
                self.enter(SessionState::Failed, "fail");
                self.inner.lock().last_error = Some(err.to_string());
                publish_state(&self.event_bus, Some(session_id), SessionState::Failed).await;
                let failure = PromptcapError::from(e);
                let _ = self
                    .event_bus
                    .publish(PromptcapEvent::SessionFailed {
                        session_id: Some(session_id),
                        code: failure.code(),
                        error: failure.to_string(),
                    })
                    .await;
                self.done.send_replace(Some(Err(err)));
            }
        }
    }

    /// Remove listener and overlay, then release every stream
    async fn cleanup(&mut self) {
        if let Some(mut listener) = self.end_listener.take() {
            listener.remove().await;
        }
        if let Some(mut overlay) = self.overlay.take() {
            overlay.unmount();
        }
        self.session.set_overlay(None);
        self.streams.release();
        debug!("Released streams for recording {}", self.session.id());
    }

    fn enter(&mut self, next: SessionState, action: &'static str) {
        if let Err(e) = self.session.transition(next, action) {
            warn!("{}", e);
            return;
        }
        self.inner.lock().state = next;
    }
}
