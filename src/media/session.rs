use super::{MediaKind, TrackSource};
use crate::platform::{MediaTrack, TrackSettings};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerRole {
    Preview,
    Capture,
}

/// Identifies the component that owns a set of live device bindings
///
/// Tokens are handed to the negotiator on every acquisition so that the
/// release-before-acquire rule is checked against explicit owners rather
/// than ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    id: Uuid,
    role: OwnerRole,
}

impl OwnerToken {
    pub fn new(role: OwnerRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> OwnerRole {
        self.role
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            OwnerRole::Preview => "preview",
            OwnerRole::Capture => "capture",
        };
        write!(f, "{}:{}", role, &self.id.simple().to_string()[..8])
    }
}

struct Binding {
    session_id: Uuid,
    owner: OwnerToken,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl Binding {
    fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }
}

/// Process-wide table of which session holds each physical source
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    bindings: Arc<Mutex<HashMap<TrackSource, Binding>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `session_id` now consumes the sources of `tracks`
    ///
    /// # Panics
    /// Panics if a source is still bound to a different live session. The
    /// negotiator releases every source before acquiring it again, so a live
    /// binding here is a programming error.
    pub(crate) fn bind(&self, session_id: Uuid, owner: &OwnerToken, tracks: &[Arc<dyn MediaTrack>]) {
        let mut grouped: HashMap<TrackSource, Vec<Arc<dyn MediaTrack>>> = HashMap::new();
        for track in tracks {
            grouped
                .entry(track.source().clone())
                .or_default()
                .push(Arc::clone(track));
        }

        let mut bindings = self.bindings.lock();
        for (source, tracks) in grouped {
            if let Some(existing) = bindings.get(&source) {
                assert!(
                    existing.session_id == session_id || !existing.is_live(),
                    "source {} is already bound to live session {} owned by {}",
                    source,
                    existing.session_id,
                    existing.owner
                );
            }
            debug!("Binding {} to session {} ({})", source, session_id, owner);
            bindings.insert(
                source,
                Binding {
                    session_id,
                    owner: owner.clone(),
                    tracks,
                },
            );
        }
    }

    /// Stop and forget whatever session is bound to `source`
    ///
    /// Returns true if a live binding was stopped.
    pub fn release_source(&self, source: &TrackSource) -> bool {
        let removed = self.bindings.lock().remove(source);
        match removed {
            Some(binding) => Self::stop_binding(source, binding),
            None => false,
        }
    }

    /// Release every device binding of one kind
    ///
    /// Used when the platform picks the device, so the exact source is
    /// unknown until after acquisition.
    pub fn release_kind(&self, kind: MediaKind) -> usize {
        self.release_where(|source, _| {
            matches!(source, TrackSource::Device { kind: k, .. } if *k == kind)
        })
    }

    /// Release everything held by `owner`
    pub fn release_owner(&self, owner: &OwnerToken) -> usize {
        self.release_where(|_, binding| binding.owner == *owner)
    }

    fn release_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&TrackSource, &Binding) -> bool,
    {
        let removed: Vec<(TrackSource, Binding)> = {
            let mut bindings = self.bindings.lock();
            let keys: Vec<TrackSource> = bindings
                .iter()
                .filter(|(source, binding)| predicate(source, binding))
                .map(|(source, _)| source.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| bindings.remove(&k).map(|b| (k, b)))
                .collect()
        };

        removed
            .into_iter()
            .filter(|(source, binding)| {
                let was_live = binding.is_live();
                for track in &binding.tracks {
                    track.stop();
                }
                debug!("Released {} from session {}", source, binding.session_id);
                was_live
            })
            .count()
    }

    fn stop_binding(source: &TrackSource, binding: Binding) -> bool {
        let was_live = binding.is_live();
        for track in &binding.tracks {
            track.stop();
        }
        if was_live {
            info!(
                "Stopped live session {} on {} before reacquiring",
                binding.session_id, source
            );
        }
        was_live
    }

    /// Forget the bindings of a session whose tracks the caller has stopped
    pub(crate) fn unbind_session(&self, session_id: Uuid) {
        self.bindings
            .lock()
            .retain(|_, binding| binding.session_id != session_id);
    }

    /// Session and owner currently consuming `source`, if live
    pub fn live_binding(&self, source: &TrackSource) -> Option<(Uuid, OwnerToken)> {
        self.bindings
            .lock()
            .get(source)
            .filter(|b| b.is_live())
            .map(|b| (b.session_id, b.owner.clone()))
    }

    /// Number of sources with a live binding
    pub fn live_count(&self) -> usize {
        self.bindings.lock().values().filter(|b| b.is_live()).count()
    }
}

/// What a media session was acquired for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    Camera,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSessionState {
    Live,
    /// Every track ended without an explicit release
    Ended,
    Released,
}

/// A live bundle of tracks owned by exactly one component
///
/// Releasing stops every track and drops the registry bindings. Dropping the
/// last handle releases as well, so a session can never outlive its owner.
pub struct MediaSession {
    id: Uuid,
    source: SessionSource,
    owner: OwnerToken,
    tracks: Vec<Arc<dyn MediaTrack>>,
    registry: DeviceRegistry,
    released: AtomicBool,
    acquired_at: DateTime<Utc>,
}

impl MediaSession {
    pub(crate) fn bind(
        source: SessionSource,
        owner: &OwnerToken,
        tracks: Vec<Arc<dyn MediaTrack>>,
        registry: &DeviceRegistry,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        registry.bind(id, owner, &tracks);

        Arc::new(Self {
            id,
            source,
            owner: owner.clone(),
            tracks,
            registry: registry.clone(),
            released: AtomicBool::new(false),
            acquired_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> SessionSource {
        self.source
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(MediaKind::Video)
    }

    pub fn audio_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(MediaKind::Audio)
    }

    fn tracks_of(&self, kind: MediaKind) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// The (kind, source) pairs this session consumes
    pub fn track_sources(&self) -> Vec<(MediaKind, TrackSource)> {
        self.tracks
            .iter()
            .map(|t| (t.kind(), t.source().clone()))
            .collect()
    }

    /// Settings of the first video track
    pub fn video_settings(&self) -> Option<TrackSettings> {
        self.tracks
            .iter()
            .find(|t| t.kind() == MediaKind::Video)
            .map(|t| t.settings())
    }

    pub fn state(&self) -> MediaSessionState {
        if self.released.load(Ordering::SeqCst) {
            MediaSessionState::Released
        } else if self.tracks.iter().any(|t| t.is_live()) {
            MediaSessionState::Live
        } else {
            MediaSessionState::Ended
        }
    }

    pub fn is_live(&self) -> bool {
        self.state() == MediaSessionState::Live
    }

    /// Stop all tracks and give up the device bindings; idempotent
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        for track in &self.tracks {
            track.stop();
        }
        self.registry.unbind_session(self.id);
        debug!(
            "Released {:?} session {} ({} tracks, owner {})",
            self.source,
            self.id,
            self.tracks.len(),
            self.owner
        );
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSession")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("owner", &self.owner)
            .field("tracks", &self.tracks)
            .field("state", &self.state())
            .finish()
    }
}
