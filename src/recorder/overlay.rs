use super::state::OverlayElements;
use crate::error::SessionError;
use crate::platform::{MediaTrack, OverlayCompositor, OverlayPlacement};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Self-view and stop control mounted for one combined recording
///
/// Unmounted explicitly when the recording ends and again on drop, so no
/// element survives its session.
pub struct OverlayGuard {
    compositor: Arc<dyn OverlayCompositor>,
    elements: Option<OverlayElements>,
}

impl OverlayGuard {
    /// Mount both surfaces; if the stop control fails the self-view is removed
    pub fn mount(
        compositor: Arc<dyn OverlayCompositor>,
        self_view: Arc<dyn MediaTrack>,
        placement: &OverlayPlacement,
        on_stop: CancellationToken,
    ) -> Result<Self, SessionError> {
        let preview_tag = compositor.mount_self_view(self_view, placement)?;
        let stop_control_tag = match compositor.mount_stop_control(on_stop) {
            Ok(tag) => tag,
            Err(e) => {
                compositor.unmount(preview_tag);
                return Err(e);
            }
        };

        info!(
            "Overlay mounted: self-view {} in {:?}, stop control {}",
            preview_tag, placement.corner, stop_control_tag
        );
        Ok(Self {
            compositor,
            elements: Some(OverlayElements {
                preview_tag,
                stop_control_tag,
            }),
        })
    }

    pub fn elements(&self) -> Option<OverlayElements> {
        self.elements
    }

    pub fn unmount(&mut self) {
        if let Some(elements) = self.elements.take() {
            self.compositor.unmount(elements.stop_control_tag);
            self.compositor.unmount(elements.preview_tag);
            debug!("Overlay unmounted");
        }
    }
}

impl Drop for OverlayGuard {
    fn drop(&mut self) {
        self.unmount();
    }
}
