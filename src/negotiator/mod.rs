//! Constraint building and stream acquisition.


use crate::config::{AudioConfig, CameraConfig, CaptureConfig, PromptcapConfig};
use crate::error::{AcquisitionError, Result, SessionError};
use crate::events::{EventBus, PromptcapEvent};
use crate::media::{
    camera_constraints, display_constraints, CaptureConstraints, ConstraintInputs,
    DeviceRegistry, DisplayConstraints, MediaKind, MediaSession, Orientation, OwnerToken,
    RecordingMode, Resolution, SessionSource, TrackSource,
};
use crate::platform::MediaPlatform;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the caller wants to capture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamRequest {
    pub mode: RecordingMode,
    /// Explicit resolution; pins the orientation
    pub resolution: Option<Resolution>,
    pub video_device_id: Option<String>,
    pub audio_device_id: Option<String>,
    /// Capture the microphone alongside the camera
    pub include_audio: bool,
}

impl StreamRequest {
    pub fn new(mode: RecordingMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn requested_orientation(&self) -> Option<Orientation> {
        self.resolution.map(|r| r.orientation())
    }
}

/// Non-fatal conditions noticed while negotiating
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationWarning {
    /// The platform delivered the other orientation than was asked for
    OrientationMismatch {
        requested: Orientation,
        delivered: Resolution,
    },
}

/// Sessions produced by one negotiation
///
/// Combined mode yields two independent sessions which the caller composes.
#[derive(Debug, Default)]
pub struct AcquiredStreams {
    pub camera: Option<Arc<MediaSession>>,
    pub screen: Option<Arc<MediaSession>>,
    pub warnings: Vec<NegotiationWarning>,
}

impl AcquiredStreams {
    pub fn sessions(&self) -> impl Iterator<Item = &Arc<MediaSession>> {
        self.camera.iter().chain(self.screen.iter())
    }

    pub fn release(&self) {
        for session in self.sessions() {
            session.release();
        }
    }
}

pub struct StreamNegotiator {
    platform: Arc<dyn MediaPlatform>,
    registry: DeviceRegistry,
    event_bus: Arc<EventBus>,
    camera: CameraConfig,
    audio: AudioConfig,
    capture: CaptureConfig,
}

impl StreamNegotiator {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        registry: DeviceRegistry,
        config: &PromptcapConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            platform,
            registry,
            event_bus,
            camera: config.camera.clone(),
            audio: config.audio.clone(),
            capture: config.capture.clone(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    fn inputs<'a>(&self, request: &'a StreamRequest) -> ConstraintInputs<'a> {
        ConstraintInputs {
            mode: request.mode,
            resolution: request.resolution,
            video_device_id: request.video_device_id.as_deref(),
            audio_device_id: request.audio_device_id.as_deref(),
            is_mobile: self.capture.is_mobile,
            include_audio: request.include_audio,
            include_system_audio: self.capture.include_system_audio,
        }
    }

    pub fn camera_constraints(&self, request: &StreamRequest) -> CaptureConstraints {
        camera_constraints(&self.inputs(request), &self.camera, &self.audio)
    }

    pub fn display_constraints(&self, request: &StreamRequest) -> DisplayConstraints {
        display_constraints(&self.inputs(request), &self.camera, &self.audio)
    }

    /// Acquire every stream `request.mode` needs on behalf of `owner`
    pub async fn acquire(&self, owner: &OwnerToken, request: &StreamRequest) -> Result<AcquiredStreams> {
        self.acquire_cancellable(owner, request, &CancellationToken::new())
            .await
    }

    /// Like [`acquire`](Self::acquire), abandoning the attempt when `cancel` fires
    ///
    /// Whatever was acquired before a failure or cancellation is released
    /// before returning.
    pub async fn acquire_cancellable(
        &self,
        owner: &OwnerToken,
        request: &StreamRequest,
        cancel: &CancellationToken,
    ) -> Result<AcquiredStreams> {
        let released = self.registry.release_owner(owner);
        if released > 0 {
            debug!("Released {} prior bindings held by {}", released, owner);
        }

        let mut streams = AcquiredStreams::default();

        if request.mode.uses_camera() {
            let camera = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled.into()),
                result = self.acquire_camera(owner, request) => result?,
            };
            if let Some(warning) = self.check_orientation(request, &camera).await {
                streams.warnings.push(warning);
            }
            streams.camera = Some(camera);
        }

        if request.mode.uses_screen() {
            let screen: Result<Arc<MediaSession>> = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SessionError::Cancelled.into()),
                result = self.acquire_screen(owner, request) => result.map_err(Into::into),
            };
            match screen {
                Ok(screen) => streams.screen = Some(screen),
                Err(e) => {
                    if streams.camera.is_some() {
                        info!("Releasing camera after screen acquisition did not complete");
                    }
                    streams.release();
                    return Err(e);
                }
            }
        }

        if cancel.is_cancelled() {
            streams.release();
            return Err(SessionError::Cancelled.into());
        }

        info!(
            "Acquired {} streams for {} (camera: {}, screen: {})",
            request.mode,
            owner,
            streams.camera.is_some(),
            streams.screen.is_some()
        );
        Ok(streams)
    }

    /// Acquire the camera (and microphone, if requested)
    ///
    /// Any live binding on the same devices is stopped first.
    pub async fn acquire_camera(
        &self,
        owner: &OwnerToken,
        request: &StreamRequest,
    ) -> std::result::Result<Arc<MediaSession>, AcquisitionError> {
        let constraints = self.camera_constraints(request);

        self.release_device(MediaKind::Video, constraints.video_device_id());
        if constraints.audio.is_some() {
            self.release_device(MediaKind::Audio, constraints.audio_device_id());
        }

        debug!("Requesting camera with {:?}", constraints);
        let tracks = self.platform.get_user_media(&constraints).await?;
        Ok(MediaSession::bind(
            SessionSource::Camera,
            owner,
            tracks,
            &self.registry,
        ))
    }

    /// Acquire a monitor-level display capture
    pub async fn acquire_screen(
        &self,
        owner: &OwnerToken,
        request: &StreamRequest,
    ) -> std::result::Result<Arc<MediaSession>, AcquisitionError> {
        if !self.platform.supports_display_capture() {
            return Err(AcquisitionError::PlatformUnsupported {
                feature: "display capture".to_string(),
            });
        }

        let constraints = self.display_constraints(request);
        self.registry.release_source(&TrackSource::Display);

        debug!("Requesting display capture with {:?}", constraints);
        let tracks = self.platform.get_display_media(&constraints).await?;
        Ok(MediaSession::bind(
            SessionSource::Screen,
            owner,
            tracks,
            &self.registry,
        ))
    }

    /// Release everything `owner` holds
    pub fn release(&self, owner: &OwnerToken) -> usize {
        self.registry.release_owner(owner)
    }

    fn release_device(&self, kind: MediaKind, device_id: Option<&str>) {
        match device_id {
            Some(id) => {
                if self.registry.release_source(&TrackSource::device(kind, id)) {
                    debug!("Stopped prior session on {} {}", kind, id);
                }
            }
            // The platform picks the device, so nothing of this kind may stay live
            None => {
                let released = self.registry.release_kind(kind);
                if released > 0 {
                    debug!("Stopped {} prior {} bindings", released, kind);
                }
            }
        }
    }

    async fn check_orientation(
        &self,
        request: &StreamRequest,
        session: &MediaSession,
    ) -> Option<NegotiationWarning> {
        let requested = request.requested_orientation()?;
        let delivered = session.video_settings()?.resolution()?;
        if delivered.orientation() == requested {
            return None;
        }

        warn!(
            "Requested {} capture but the platform delivered {}; keeping the stream",
            requested, delivered
        );
        let _ = self
            .event_bus
            .publish(PromptcapEvent::OrientationMismatch {
                requested,
                delivered_width: delivered.width,
                delivered_height: delivered.height,
            })
            .await;

        Some(NegotiationWarning::OrientationMismatch {
            requested,
            delivered,
        })
    }
}
