use super::orchestrator::Studio;
use super::types::StudioSnapshot;
use crate::devices::DeviceListing;
use crate::error::{AcquisitionError, PromptcapError, Result, SessionError, TimelineError};
use crate::events::PromptcapEvent;
use crate::export::{EditList, ExportOutput};
use crate::media::{MediaKind, Orientation, RecordingMode, Resolution};
use crate::negotiator::StreamRequest;
use crate::recorder::Artifact;
use crate::teleprompter::Teleprompter;
use crate::timeline::TimelineModel;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl Studio {
    /// Request for the configured mode, devices and orientation
    pub fn stream_request(&self) -> StreamRequest {
        let settings = self.settings.lock();
        StreamRequest {
            mode: settings.mode,
            resolution: settings
                .orientation
                .map(|o| Resolution::for_orientation(self.config.camera.resolution, o)),
            video_device_id: settings.video_device_id.clone(),
            audio_device_id: settings.audio_device_id.clone(),
            include_audio: self.config.audio.enabled,
        }
    }

    fn preview_request(&self) -> StreamRequest {
        StreamRequest {
            mode: RecordingMode::Camera,
            include_audio: false,
            ..self.stream_request()
        }
    }

    pub async fn list_devices(&self, kind: MediaKind) -> Result<DeviceListing> {
        self.catalog.list(kind).await
    }

    /// Choose the capture device for `kind`; `None` returns to the default
    pub async fn select_device(&self, kind: MediaKind, device_id: Option<String>) -> Result<()> {
        if let Some(id) = &device_id {
            let listing = self.catalog.list(kind).await?;
            if !listing.devices.iter().any(|d| &d.id == id) {
                return Err(AcquisitionError::DeviceUnavailable {
                    device_id: Some(id.clone()),
                    details: format!("no {} device with this id", kind),
                }
                .into());
            }
        }

        {
            let mut settings = self.settings.lock();
            match kind {
                MediaKind::Video => settings.video_device_id = device_id.clone(),
                MediaKind::Audio => settings.audio_device_id = device_id.clone(),
            }
        }
        info!(
            "Selected {} device {}",
            kind,
            device_id.as_deref().unwrap_or("(default)")
        );

        if kind == MediaKind::Video {
            self.refresh_preview().await?;
        }
        Ok(())
    }

    /// Pin the camera orientation for preview and recording
    pub async fn set_resolution(&self, orientation: Orientation) -> Result<()> {
        self.settings.lock().orientation = Some(orientation);
        info!("Orientation set to {}", orientation);
        self.refresh_preview().await
    }

    pub fn set_mode(&self, mode: RecordingMode) -> Result<()> {
        let state = self.capture.state();
        if state.is_active() {
            return Err(SessionError::InvalidTransition {
                from: state,
                action: "change mode",
            }
            .into());
        }
        self.settings.lock().mode = mode;
        info!("Recording mode set to {}", mode);
        Ok(())
    }

    /// Show the camera preview and keep it up between recordings
    pub async fn show_preview(&self) -> Result<Uuid> {
        let state = self.capture.state();
        if state.is_active() {
            return Err(SessionError::InvalidTransition {
                from: state,
                action: "show preview",
            }
            .into());
        }
        self.settings.lock().preview_enabled = true;
        let session = self.preview.acquire_and_show(&self.preview_request()).await?;
        Ok(session.id())
    }

    pub async fn hide_preview(&self) {
        self.settings.lock().preview_enabled = false;
        self.preview.hide().await;
    }

    /// Re-acquire the preview with the current settings if it is enabled
    async fn refresh_preview(&self) -> Result<()> {
        let enabled = self.settings.lock().preview_enabled;
        if enabled && !self.capture.state().is_active() {
            self.preview.acquire_and_show(&self.preview_request()).await?;
        }
        Ok(())
    }

    /// Bring the preview back after a recording ended, if it was enabled
    pub(super) async fn restore_preview(&self) {
        let enabled = self.settings.lock().preview_enabled;
        if !enabled
            || self.cancellation_token.is_cancelled()
            || self.preview.is_showing()
            || self.capture.state().is_active()
        {
            return;
        }
        if let Err(e) = self.preview.acquire_and_show(&self.preview_request()).await {
            warn!("Could not restore preview: {}", e);
        }
        // Shutdown may have finished while the camera was being acquired
        if self.cancellation_token.is_cancelled() {
            debug!("Studio shut down during preview restore, releasing camera");
            self.preview.hide().await;
        }
    }

    /// Start recording with the current settings; returns once live
    pub async fn start_session(&self) -> Result<Uuid> {
        let request = self.stream_request();

        // The capture session takes over the devices; the preview comes back
        // after the recording ends
        self.preview.hide().await;

        match self.capture.start(request).await {
            Ok(session_id) => {
                if let Some(prompter) = self.teleprompter.lock().as_mut() {
                    prompter.reset();
                    prompter.start();
                }
                Ok(session_id)
            }
            Err(e) => {
                self.restore_preview().await;
                Err(e)
            }
        }
    }

    /// Stop recording and wait for the artifact
    pub async fn stop_session(&self) -> Result<Option<Artifact>> {
        let artifact = self.capture.stop().await;
        if let Some(prompter) = self.teleprompter.lock().as_mut() {
            prompter.pause();
        }
        artifact
    }

    /// Load a script to scroll while recording
    pub fn load_script(&self, script: &str) {
        let prompter = Teleprompter::from_config(script, &self.config.teleprompter);
        info!(
            "Loaded script: {} words, about {:.0}s at {} wpm",
            prompter.word_count(),
            prompter.estimated_duration().as_secs_f64(),
            prompter.words_per_minute()
        );
        *self.teleprompter.lock() = Some(prompter);
    }

    /// Make `artifact` the timeline source
    pub async fn load_timeline(&self, artifact: &Artifact) {
        let event = {
            let mut timeline = self.timeline.lock();
            timeline.load_artifact(artifact);
            timeline_changed(&timeline)
        };
        let _ = self.event_bus.publish(event).await;
    }

    async fn edit_timeline<T>(
        &self,
        edit: impl FnOnce(&mut TimelineModel) -> std::result::Result<T, TimelineError>,
    ) -> Result<T> {
        let (result, event) = {
            let mut timeline = self.timeline.lock();
            let result = edit(&mut timeline);
            (result, timeline_changed(&timeline))
        };
        let value = result?;
        let _ = self.event_bus.publish(event).await;
        Ok(value)
    }

    pub async fn split(&self, at: f64) -> Result<usize> {
        self.edit_timeline(|t| t.split(at)).await
    }

    pub async fn delete_range(&self, start: f64, end: f64) -> Result<usize> {
        self.edit_timeline(|t| t.delete_range(start, end)).await
    }

    pub async fn reorder(&self, from: usize, to: usize) -> Result<()> {
        self.edit_timeline(|t| t.reorder(from, to)).await
    }

    pub async fn trim(&self, index: usize, start: f64, end: f64) -> Result<()> {
        self.edit_timeline(|t| t.trim(index, start, end)).await
    }

    pub fn mark_in(&self, at: f64) {
        self.timeline.lock().mark_in(at);
    }

    pub fn mark_out(&self, at: f64) {
        self.timeline.lock().mark_out(at);
    }

    pub async fn delete_selection(&self) -> Result<usize> {
        self.edit_timeline(|t| t.delete_selection()).await
    }

    /// Returns false when there was nothing to undo
    pub async fn undo(&self) -> bool {
        self.edit_timeline(|t| Ok(t.undo())).await.unwrap_or(false)
    }

    /// Returns false when there was nothing to redo
    pub async fn redo(&self) -> bool {
        self.edit_timeline(|t| Ok(t.redo())).await.unwrap_or(false)
    }

    /// Export the latest recording, with its edit list when it was edited
    pub async fn export(&self) -> Result<ExportOutput> {
        let artifact = self
            .capture
            .last_artifact()
            .ok_or_else(|| PromptcapError::component("export", "no finished recording"))?;

        let edits = {
            let timeline = self.timeline.lock();
            if timeline.source_id() == Some(artifact.id) {
                EditList::from_timeline(&artifact, &timeline)
            } else {
                None
            }
        };
        debug!(
            "Exporting {} ({} bytes, edited: {})",
            artifact.id,
            artifact.size(),
            edits.is_some()
        );

        self.exporter
            .export(&artifact, &artifact.mime_type, edits.as_ref())
            .await
    }

    pub fn snapshot(&self) -> StudioSnapshot {
        let settings = self.settings.lock().clone();
        let timeline = self.timeline.lock();
        let prompt_line = self
            .teleprompter
            .lock()
            .as_ref()
            .and_then(|p| p.current_line().map(str::to_string));

        StudioSnapshot {
            session_state: self.capture.state(),
            mode: settings.mode,
            orientation: settings.orientation,
            video_devices: self.catalog.cached(MediaKind::Video),
            audio_devices: self.catalog.cached(MediaKind::Audio),
            preview_session: self.preview.current().map(|s| s.id()),
            clips: timeline.clips().to_vec(),
            edited_duration: timeline.edited_duration(),
            can_undo: timeline.can_undo(),
            can_redo: timeline.can_redo(),
            prompt_line,
        }
    }
}

fn timeline_changed(timeline: &TimelineModel) -> PromptcapEvent {
    PromptcapEvent::TimelineChanged {
        clip_count: timeline.clips().len(),
        can_undo: timeline.can_undo(),
        can_redo: timeline.can_redo(),
    }
}
