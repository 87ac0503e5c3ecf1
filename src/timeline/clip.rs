use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A `[start, end)` range of the source recording, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineClip {
    pub id: Uuid,
    pub start: f64,
    pub end: f64,
}

impl TimelineClip {
    /// New clip with a freshly generated id
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Strictly inside the clip; the edges do not count
    pub fn contains(&self, at: f64) -> bool {
        self.start < at && at < self.end
    }

    /// Shares any time with `[start, end)`
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        !(self.start >= end || self.end <= start)
    }

    /// Cut at `at` into two clips with new ids
    pub(crate) fn split_at(&self, at: f64) -> (TimelineClip, TimelineClip) {
        (
            TimelineClip::new(self.start, at),
            TimelineClip::new(at, self.end),
        )
    }
}

/// Ordered clip sequence; order is playback order
///
/// Clips may leave gaps or overlap after edits. Nothing is merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layer {
    clips: Vec<TimelineClip>,
}

impl Layer {
    pub fn new(clips: Vec<TimelineClip>) -> Self {
        Self { clips }
    }

    pub fn clips(&self) -> &[TimelineClip] {
        &self.clips
    }

    pub(crate) fn clips_mut(&mut self) -> &mut Vec<TimelineClip> {
        &mut self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Sum of clip durations, i.e. the length of the edited cut
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(TimelineClip::duration).sum()
    }
}
