//! Clip timeline over a finished recording.

mod clip;
mod history;
mod model;

pub use clip::{Layer, TimelineClip};
pub use history::{HistoryEntry, HistoryManager};
pub use model::TimelineModel;
