//! Capture device enumeration with permission tracking and hot-plug refresh.


use crate::error::{PromptcapError, Result};
use crate::events::{EventBus, EventFilter, EventReceiver, PromptcapEvent};
use crate::media::{CaptureDevice, MediaKind};
use crate::platform::{MediaPlatform, PermissionState};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of listing one kind of device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    pub kind: MediaKind,
    /// Authorized devices in platform order
    pub devices: Vec<CaptureDevice>,
    /// Access has not been granted; request permission and list again
    pub permission_needed: bool,
}

impl DeviceListing {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn default_device(&self) -> Option<&CaptureDevice> {
        self.devices
            .iter()
            .find(|d| d.is_default)
            .or_else(|| self.devices.first())
    }
}

/// Enumerates capture devices and keeps the last listing per kind
pub struct DeviceCatalog {
    platform: Arc<dyn MediaPlatform>,
    event_bus: Arc<EventBus>,
    cache: RwLock<HashMap<MediaKind, Vec<CaptureDevice>>>,
    watcher: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl DeviceCatalog {
    pub fn new(platform: Arc<dyn MediaPlatform>, event_bus: Arc<EventBus>) -> Self {
        Self {
            platform,
            event_bus,
            cache: RwLock::new(HashMap::new()),
            watcher: Mutex::new(None),
        }
    }

    /// List authorized devices of `kind`
    ///
    /// Devices without an id are not authorized yet and never returned. When
    /// access is not granted the listing is empty and `PermissionNeeded` is
    /// published. Enumeration failures are published as `DeviceAccessFailed`
    /// and returned; they never tear anything down.
    pub async fn list(&self, kind: MediaKind) -> Result<DeviceListing> {
        let listing = match self.fetch(kind).await {
            Ok(listing) => listing,
            Err(e) => {
                self.report_access_failure(&e).await;
                return Err(e);
            }
        };

        if listing.permission_needed {
            warn!("No {} access yet; devices hidden until permission is granted", kind);
            let _ = self
                .event_bus
                .publish(PromptcapEvent::PermissionNeeded { kind })
                .await;
        }

        self.cache.write().insert(kind, listing.devices.clone());
        Ok(listing)
    }

    async fn fetch(&self, kind: MediaKind) -> Result<DeviceListing> {
        let all = self.platform.enumerate_devices().await?;
        let granted = self.platform.permission(kind) == PermissionState::Granted;

        let devices: Vec<CaptureDevice> = if granted {
            all.into_iter()
                .filter(|d| d.kind == kind && d.is_authorized())
                .collect()
        } else {
            Vec::new()
        };

        debug!("Listed {} {} devices (granted: {})", devices.len(), kind, granted);
        Ok(DeviceListing {
            kind,
            devices,
            permission_needed: !granted,
        })
    }

    async fn report_access_failure(&self, e: &PromptcapError) {
        error!("Device enumeration failed: {}", e);
        let _ = self
            .event_bus
            .publish(PromptcapEvent::DeviceAccessFailed {
                error: e.to_string(),
            })
            .await;
    }

    /// Re-list every kind, replacing the cached lists wholesale
    pub async fn refresh(&self) -> Result<()> {
        let video = self.list(MediaKind::Video).await?;
        let audio = self.list(MediaKind::Audio).await?;

        info!(
            "Device lists refreshed: {} video, {} audio",
            video.devices.len(),
            audio.devices.len()
        );
        let _ = self
            .event_bus
            .publish(PromptcapEvent::DevicesChanged {
                video_devices: video.devices.len(),
                audio_devices: audio.devices.len(),
                timestamp: SystemTime::now(),
            })
            .await;
        Ok(())
    }

    /// Ask the platform for access, re-listing once it is granted
    pub async fn request_permission(&self, kind: MediaKind) -> Result<PermissionState> {
        let state = self.platform.request_permission(kind).await?;
        info!("Permission for {} devices: {:?}", kind, state);
        if state == PermissionState::Granted {
            self.refresh().await?;
        }
        Ok(state)
    }

    pub fn permission(&self, kind: MediaKind) -> PermissionState {
        self.platform.permission(kind)
    }

    /// Devices from the most recent listing
    pub fn cached(&self, kind: MediaKind) -> Vec<CaptureDevice> {
        self.cache.read().get(&kind).cloned().unwrap_or_default()
    }

    pub fn find(&self, kind: MediaKind, device_id: &str) -> Option<CaptureDevice> {
        self.cache
            .read()
            .get(&kind)
            .and_then(|devices| devices.iter().find(|d| d.id == device_id).cloned())
    }

    /// Subscribe to re-listed device notifications
    pub fn on_change(&self, name: &str) -> EventReceiver {
        self.event_bus
            .subscribe_filtered(EventFilter::EventTypes(vec!["devices_changed"]), name)
    }

    /// Refresh on every platform hot-plug notification until stopped
    pub fn start_watching(self: &Arc<Self>) {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            debug!("Device watcher already running");
            return;
        }

        let token = CancellationToken::new();
        let changes = self.platform.device_changes();
        let catalog = Arc::clone(self);
        let handle = tokio::spawn(catalog.watch(changes, token.clone()));
        *watcher = Some((token, handle));
        info!("Watching for device changes");
    }

    async fn watch(self: Arc<Self>, mut changes: broadcast::Receiver<()>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                change = changes.recv() => match change {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        debug!("Device change notification received");
                        if let Err(e) = self.refresh().await {
                            warn!("Device refresh after hot-plug failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Device watcher stopped");
    }

    pub async fn stop_watching(&self) {
        let watcher = self.watcher.lock().take();
        if let Some((token, handle)) = watcher {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("Device watcher task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}
