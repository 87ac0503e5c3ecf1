//! Binds one live session at a time to the preview sink.


use crate::error::{PromptcapError, Result};
use crate::events::{EventBus, PromptcapEvent};
use crate::media::{MediaSession, OwnerRole, OwnerToken, RecordingMode};
use crate::negotiator::{StreamNegotiator, StreamRequest};
use crate::platform::PreviewSink;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the preview sink and whichever session is shown on it
///
/// Playback is always muted. Whatever session is bound is released on
/// `hide`, on replacement and on drop.
pub struct PreviewController {
    sink: Arc<dyn PreviewSink>,
    negotiator: Arc<StreamNegotiator>,
    event_bus: Arc<EventBus>,
    owner: OwnerToken,
    bound: Mutex<Option<Arc<MediaSession>>>,
}

impl PreviewController {
    pub fn new(
        sink: Arc<dyn PreviewSink>,
        negotiator: Arc<StreamNegotiator>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            sink,
            negotiator,
            event_bus,
            owner: OwnerToken::new(OwnerRole::Preview),
            bound: Mutex::new(None),
        }
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    /// Bind `session` to the sink, replacing whatever was shown
    pub async fn show(&self, session: Arc<MediaSession>) {
        let previous = {
            let mut bound = self.bound.lock();
            if bound.as_ref().map(|s| s.id()) == Some(session.id()) {
                debug!("Session {} already previewed", session.id());
                return;
            }
            bound.replace(Arc::clone(&session))
        };

        if let Some(previous) = previous {
            self.sink.detach();
            previous.release();
            debug!("Preview released session {}", previous.id());
        }

        self.sink.attach(session.id(), session.tracks());
        self.sink.set_muted(true);
        if let Err(e) = self.sink.play() {
            warn!("Preview playback did not start: {}", e);
        }

        info!("Previewing session {}", session.id());
        let _ = self
            .event_bus
            .publish(PromptcapEvent::PreviewChanged {
                session_id: Some(session.id()),
            })
            .await;
    }

    /// Acquire a camera stream as the preview owner and show it
    pub async fn acquire_and_show(&self, request: &StreamRequest) -> Result<Arc<MediaSession>> {
        let request = StreamRequest {
            mode: RecordingMode::Camera,
            ..request.clone()
        };

        // Our own session must go before the negotiator asks for the device again
        self.release_bound();

        let streams = self.negotiator.acquire(&self.owner, &request).await?;
        match streams.camera {
            Some(camera) => {
                self.show(Arc::clone(&camera)).await;
                Ok(camera)
            }
            None => Err(PromptcapError::component(
                "preview",
                "camera negotiation returned no session",
            )),
        }
    }

    /// Unbind and release the current session
    pub async fn hide(&self) {
        if self.release_bound() {
            let _ = self
                .event_bus
                .publish(PromptcapEvent::PreviewChanged { session_id: None })
                .await;
        }
    }

    fn release_bound(&self) -> bool {
        let previous = self.bound.lock().take();
        match previous {
            Some(session) => {
                self.sink.detach();
                session.release();
                info!("Preview hidden, released session {}", session.id());
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<Arc<MediaSession>> {
        self.bound.lock().clone()
    }

    pub fn is_showing(&self) -> bool {
        self.bound.lock().is_some()
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        if let Some(session) = self.bound.get_mut().take() {
            self.sink.detach();
            session.release();
            debug!("Preview dropped, released session {}", session.id());
        }
    }
}
