//! Snapshot-based undo/redo for a layer.
//!
//! Every entry holds a full copy of the clip sequence, never a delta. The
//! undo stack holds the states before each edit; undoing moves the current
//! state onto the redo stack under the same label.

use super::clip::Layer;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Edit that produced the state after this snapshot, e.g. "Split"
    pub label: String,
    pub snapshot: Layer,
    pub timestamp: Instant,
}

pub struct HistoryManager {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
}

impl HistoryManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Record the state before an edit and drop any redo branch
    pub fn push(&mut self, label: &str, before: Layer) {
        self.redo_stack.clear();
        self.undo_stack.push(HistoryEntry {
            label: label.to_string(),
            snapshot: before,
            timestamp: Instant::now(),
        });

        if self.undo_stack.len() > self.max_entries {
            let excess = self.undo_stack.len() - self.max_entries;
            self.undo_stack.drain(..excess);
        }

        debug!(label, undo_depth = self.undo_stack.len(), "History entry pushed");
    }

    /// Swap `current` for the previous snapshot
    pub fn undo(&mut self, current: Layer) -> Option<Layer> {
        let entry = self.undo_stack.pop()?;
        debug!(label = %entry.label, undo_remaining = self.undo_stack.len(), "Undo");
        self.redo_stack.push(HistoryEntry {
            label: entry.label,
            snapshot: current,
            timestamp: Instant::now(),
        });
        Some(entry.snapshot)
    }

    /// Swap `current` for the next snapshot
    pub fn redo(&mut self, current: Layer) -> Option<Layer> {
        let entry = self.redo_stack.pop()?;
        debug!(label = %entry.label, redo_remaining = self.redo_stack.len(), "Redo");
        self.undo_stack.push(HistoryEntry {
            label: entry.label,
            snapshot: current,
            timestamp: Instant::now(),
        });
        Some(entry.snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Labels of undoable edits, most recent first
    pub fn undo_labels(&self) -> Vec<&str> {
        self.undo_stack.iter().rev().map(|e| e.label.as_str()).collect()
    }

    /// Labels of redoable edits, next redo first
    pub fn redo_labels(&self) -> Vec<&str> {
        self.redo_stack.iter().rev().map(|e| e.label.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
