//! Hand-off of finished recordings.
//!
//! The core never inspects codec data: an exporter receives the blob and its
//! declared MIME type, plus the kept clips when the recording was edited, and
//! leaves cutting or transcoding to whatever consumes its output.

use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::events::{EventBus, PromptcapEvent};
use crate::recorder::{extension_for_mime, Artifact};
use crate::timeline::{TimelineClip, TimelineModel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Kept clips in playback order, for an external cutter/transcoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditList {
    pub artifact_id: Uuid,
    pub mime_type: String,
    pub source_duration: f64,
    pub edited_duration: f64,
    pub clips: Vec<TimelineClip>,
    pub created_at: DateTime<Utc>,
}

impl EditList {
    /// Edit list for `artifact`, or `None` when the timeline is untouched
    pub fn from_timeline(artifact: &Artifact, timeline: &TimelineModel) -> Option<Self> {
        if !timeline.is_edited() {
            return None;
        }
        Some(Self {
            artifact_id: artifact.id,
            mime_type: artifact.mime_type.clone(),
            source_duration: timeline.source_duration(),
            edited_duration: timeline.edited_duration(),
            clips: timeline.clips().to_vec(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub media_path: PathBuf,
    pub edit_list_path: Option<PathBuf>,
    pub bytes_written: u64,
}

#[async_trait]
pub trait ExportCoordinator: Send + Sync {
    async fn export(
        &self,
        artifact: &Artifact,
        mime_hint: &str,
        edits: Option<&EditList>,
    ) -> Result<ExportOutput>;
}

/// Writes recordings (and their edit lists) into a directory
pub struct FileExporter {
    output_dir: PathBuf,
    write_edit_list: bool,
    event_bus: Arc<EventBus>,
}

impl FileExporter {
    pub fn new(config: &ExportConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output_dir),
            write_edit_list: config.write_edit_list,
            event_bus,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn file_stem(artifact: &Artifact) -> String {
        let id = artifact.id.simple().to_string();
        format!(
            "recording-{}-{}",
            artifact.created_at.format("%Y%m%d-%H%M%S"),
            &id[..8]
        )
    }

    async fn write(path: &Path, contents: &[u8]) -> std::result::Result<(), ExportError> {
        fs::write(path, contents)
            .await
            .map_err(|source| ExportError::Write {
                path: path.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl ExportCoordinator for FileExporter {
    async fn export(
        &self,
        artifact: &Artifact,
        mime_hint: &str,
        edits: Option<&EditList>,
    ) -> Result<ExportOutput> {
        if artifact.is_empty() {
            return Err(ExportError::EmptyArtifact {
                artifact_id: artifact.id.to_string(),
            }
            .into());
        }

        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| ExportError::Write {
                path: self.output_dir.display().to_string(),
                source,
            })?;

        let stem = Self::file_stem(artifact);
        let media_path = self
            .output_dir
            .join(format!("{}.{}", stem, extension_for_mime(mime_hint)));
        Self::write(&media_path, &artifact.data).await?;
        debug!("Wrote {} bytes to {}", artifact.size(), media_path.display());

        let edit_list_path = match edits {
            Some(edits) if self.write_edit_list => {
                let path = self.output_dir.join(format!("{}.edits.json", stem));
                let json = serde_json::to_vec_pretty(edits).map_err(ExportError::from)?;
                Self::write(&path, &json).await?;
                debug!("Wrote edit list with {} clips", edits.clips.len());
                Some(path)
            }
            Some(_) => {
                warn!("Recording was edited but edit lists are disabled; exporting the full source");
                None
            }
            None => None,
        };

        info!("Exported recording {} to {}", artifact.id, media_path.display());
        let _ = self
            .event_bus
            .publish(PromptcapEvent::ExportCompleted {
                path: media_path.clone(),
            })
            .await;

        Ok(ExportOutput {
            media_path,
            edit_list_path,
            bytes_written: artifact.size() as u64,
        })
    }
}
