use super::clip::{Layer, TimelineClip};
use super::history::HistoryManager;
use crate::error::TimelineError;
use crate::recorder::Artifact;
use tracing::{debug, info};
use uuid::Uuid;

type TimelineResult<T> = std::result::Result<T, TimelineError>;

/// Clip editing over one recorded source
///
/// Every successful mutation pushes the prior clip sequence onto the undo
/// stack and clears redo. Rejected edits leave the sequence untouched.
pub struct TimelineModel {
    source_id: Option<Uuid>,
    source_duration: f64,
    layer: Layer,
    history: HistoryManager,
    mark_in: Option<f64>,
    mark_out: Option<f64>,
}

impl TimelineModel {
    pub fn new(max_history: usize) -> Self {
        Self {
            source_id: None,
            source_duration: 0.0,
            layer: Layer::default(),
            history: HistoryManager::new(max_history),
            mark_in: None,
            mark_out: None,
        }
    }

    /// Reset to one clip spanning the whole source
    pub fn load(&mut self, source_duration: f64) {
        let duration = if source_duration.is_finite() {
            source_duration.max(0.0)
        } else {
            0.0
        };
        self.source_duration = duration;
        self.layer = if duration > 0.0 {
            Layer::new(vec![TimelineClip::new(0.0, duration)])
        } else {
            Layer::default()
        };
        self.history.clear();
        self.mark_in = None;
        self.mark_out = None;
        self.source_id = None;
        info!("Timeline loaded with {:.3}s source", duration);
    }

    /// Load a finished recording as the source
    pub fn load_artifact(&mut self, artifact: &Artifact) {
        self.load(artifact.duration_secs());
        self.source_id = Some(artifact.id);
    }

    pub fn source_id(&self) -> Option<Uuid> {
        self.source_id
    }

    pub fn source_duration(&self) -> f64 {
        self.source_duration
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn clips(&self) -> &[TimelineClip] {
        self.layer.clips()
    }

    pub fn edited_duration(&self) -> f64 {
        self.layer.total_duration()
    }

    /// Whether the clip sequence differs from the untouched source
    pub fn is_edited(&self) -> bool {
        match self.layer.clips() {
            [only] => only.start != 0.0 || only.end != self.source_duration,
            clips => !(clips.is_empty() && self.source_duration == 0.0),
        }
    }

    /// Clip playing at `at` seconds into the edited cut, with its index
    pub fn clip_at(&self, at: f64) -> Option<(usize, &TimelineClip)> {
        if at < 0.0 {
            return None;
        }
        let mut offset = 0.0;
        for (index, clip) in self.layer.clips().iter().enumerate() {
            let next = offset + clip.duration();
            if at < next {
                return Some((index, clip));
            }
            offset = next;
        }
        None
    }

    /// Split every clip that strictly contains `at`
    pub fn split(&mut self, at: f64) -> TimelineResult<usize> {
        if !(at > 0.0 && at < self.source_duration) {
            return Err(TimelineError::SplitOutOfBounds {
                at,
                duration: self.source_duration,
            });
        }
        if !self.layer.clips().iter().any(|clip| clip.contains(at)) {
            let on_edge = self
                .layer
                .clips()
                .iter()
                .any(|clip| clip.start == at || clip.end == at);
            return Err(if on_edge {
                TimelineError::SplitAtBoundary { at }
            } else {
                TimelineError::SplitOutsideClips { at }
            });
        }

        self.history.push("Split", self.layer.clone());
        let mut split = 0;
        let clips = std::mem::take(self.layer.clips_mut());
        for clip in clips {
            if clip.contains(at) {
                let (left, right) = clip.split_at(at);
                self.layer.clips_mut().push(left);
                self.layer.clips_mut().push(right);
                split += 1;
            } else {
                self.layer.clips_mut().push(clip);
            }
        }

        debug!("Split {} clip(s) at {:.3}s", split, at);
        Ok(split)
    }

    /// Drop every clip that overlaps `[start, end)`, returning how many went
    ///
    /// A partially overlapping clip is removed whole, not trimmed. Nothing is
    /// recorded in history when no clip overlaps.
    pub fn delete_range(&mut self, start: f64, end: f64) -> TimelineResult<usize> {
        if !(start.is_finite() && end.is_finite()) || start < 0.0 || start >= end {
            return Err(TimelineError::InvalidRange { start, end });
        }

        let removed = self
            .layer
            .clips()
            .iter()
            .filter(|clip| clip.overlaps(start, end))
            .count();
        if removed == 0 {
            debug!("Delete {:.3}..{:.3}s touched no clips", start, end);
            return Ok(0);
        }

        self.history.push("Delete range", self.layer.clone());
        self.layer
            .clips_mut()
            .retain(|clip| clip.start >= end || clip.end <= start);

        debug!("Deleted {} clip(s) overlapping {:.3}..{:.3}s", removed, start, end);
        Ok(removed)
    }

    /// Move the clip at `from` to `to`, shifting the clips between
    pub fn reorder(&mut self, from: usize, to: usize) -> TimelineResult<()> {
        let len = self.layer.len();
        for index in [from, to] {
            if index >= len {
                return Err(TimelineError::IndexOutOfBounds { index, len });
            }
        }
        if from == to {
            return Ok(());
        }

        self.history.push("Reorder", self.layer.clone());
        let clip = self.layer.clips_mut().remove(from);
        self.layer.clips_mut().insert(to, clip);

        debug!("Moved clip {} -> {}", from, to);
        Ok(())
    }

    /// Narrow or widen one clip within the source bounds
    pub fn trim(&mut self, index: usize, start: f64, end: f64) -> TimelineResult<()> {
        let len = self.layer.len();
        if index >= len {
            return Err(TimelineError::IndexOutOfBounds { index, len });
        }
        if !(start >= 0.0 && start < end && end <= self.source_duration) {
            return Err(TimelineError::InvalidTrim {
                start,
                end,
                duration: self.source_duration,
            });
        }

        self.history.push("Trim", self.layer.clone());
        let clip = &mut self.layer.clips_mut()[index];
        clip.start = start;
        clip.end = end;

        debug!("Trimmed clip {} to {:.3}..{:.3}s", index, start, end);
        Ok(())
    }

    /// Set the selection start, clamped to the source
    pub fn mark_in(&mut self, at: f64) {
        self.mark_in = Some(at.clamp(0.0, self.source_duration));
    }

    /// Set the selection end, clamped to the source
    pub fn mark_out(&mut self, at: f64) {
        self.mark_out = Some(at.clamp(0.0, self.source_duration));
    }

    pub fn selection(&self) -> (Option<f64>, Option<f64>) {
        (self.mark_in, self.mark_out)
    }

    pub fn clear_selection(&mut self) {
        self.mark_in = None;
        self.mark_out = None;
    }

    /// `delete_range` over the marked selection; clears the marks on success
    pub fn delete_selection(&mut self) -> TimelineResult<usize> {
        let start = self
            .mark_in
            .ok_or(TimelineError::SelectionUnset { bound: "in point" })?;
        let end = self
            .mark_out
            .ok_or(TimelineError::SelectionUnset { bound: "out point" })?;

        let removed = self.delete_range(start, end)?;
        self.clear_selection();
        Ok(removed)
    }

    /// Restore the previous snapshot; false when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        let current = self.layer.clone();
        match self.history.undo(current) {
            Some(previous) => {
                self.layer = previous;
                true
            }
            None => false,
        }
    }

    /// Restore the next snapshot; false when there is nothing to redo
    pub fn redo(&mut self) -> bool {
        let current = self.layer.clone();
        match self.history.redo(current) {
            Some(next) => {
                self.layer = next;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    #[cfg(test)]
    pub(crate) fn set_clips(&mut self, clips: Vec<TimelineClip>) {
        self.layer = Layer::new(clips);
    }
}
