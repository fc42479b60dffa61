use std::collections::VecDeque;
use std::mem;

use crate::canvas::{PixelBuffer, SelectionMask};

pub const DEFAULT_UNDO_LIMIT: usize = 20;

// ============================================================================
// HISTORY ENTRY - full snapshot of the committed image and selection
// ============================================================================

/// One undo/redo step: the image and selection as they were before the
/// mutation labelled by `description`.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub image: PixelBuffer,
    pub mask: SelectionMask,
    pub description: String,
}

impl HistoryEntry {
    pub fn capture(description: impl Into<String>, image: &PixelBuffer, mask: &SelectionMask) -> Self {
        Self {
            image: image.clone(),
            mask: mask.clone(),
            description: description.into(),
        }
    }

    pub fn memory_size(&self) -> usize {
        self.image.as_raw().len() + self.mask.as_gray().as_raw().len()
    }

    /// Swap this entry's buffers with the live ones, returning the entry
    /// that would reverse the swap.
    fn swap_into(self, image: &mut PixelBuffer, mask: &mut SelectionMask) -> HistoryEntry {
        let previous_image = mem::replace(image, self.image);
        let previous_mask = mem::replace(mask, self.mask);
        HistoryEntry {
            image: previous_image,
            mask: previous_mask,
            description: self.description,
        }
    }
}

// ============================================================================
// HISTORY MANAGER - bounded undo stack plus redo stack
// ============================================================================

/// Undo/redo history with a fixed entry limit.
///
/// The oldest undo entry is evicted once the limit is reached. Pushing a new
/// entry discards everything on the redo stack.
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    max_history_size: usize,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_LIMIT)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            total_memory: 0,
        }
    }

    /// Snapshot the current state. Call before mutating.
    pub fn push_undo(&mut self, description: impl Into<String>, image: &PixelBuffer, mask: &SelectionMask) {
        for entry in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(entry.memory_size());
        }
        let entry = HistoryEntry::capture(description, image, mask);
        tracing::debug!(description = %entry.description, "history push");
        self.total_memory += entry.memory_size();
        self.undo_stack.push_back(entry);
        self.prune();
    }

    /// Restore the most recent snapshot into `image`/`mask`. The replaced
    /// state goes onto the redo stack.
    pub fn undo(&mut self, image: &mut PixelBuffer, mask: &mut SelectionMask) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        let description = entry.description.clone();
        let reverse = entry.swap_into(image, mask);
        self.redo_stack.push_back(reverse);
        self.recount();
        Some(description)
    }

    pub fn redo(&mut self, image: &mut PixelBuffer, mask: &mut SelectionMask) -> Option<String> {
        let entry = self.redo_stack.pop_back()?;
        let description = entry.description.clone();
        let reverse = entry.swap_into(image, mask);
        self.undo_stack.push_back(reverse);
        self.prune();
        self.recount();
        Some(description)
    }

    /// Drop the newest redo entry (used when an undo should leave no trace).
    pub fn discard_redo(&mut self) -> bool {
        match self.redo_stack.pop_back() {
            Some(entry) => {
                self.total_memory = self.total_memory.saturating_sub(entry.memory_size());
                true
            }
            None => false,
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.max_history_size = limit.max(1);
        self.prune();
    }

    pub fn limit(&self) -> usize {
        self.max_history_size
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.description.as_str())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|e| e.description.clone()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
    }

    // Swapping can change per-entry sizes when a bulk op resized the image.
    fn recount(&mut self) {
        self.total_memory = self
            .undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(HistoryEntry::memory_size)
            .sum();
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(v: u8) -> PixelBuffer {
        PixelBuffer::from_pixel(4, 4, Rgba([v, v, v, 255]))
    }

    #[test]
    fn undo_redo_round_trip_is_exact() {
        let mut history = HistoryManager::new(5);
        let mut image = solid(10);
        let mut mask = SelectionMask::new(4, 4);

        history.push_undo("paint", &image, &mask);
        image.put_pixel(1, 1, Rgba([200, 0, 0, 255]));
        mask.set(1, 1, 255);
        let after_image = image.clone();
        let after_mask = mask.clone();

        assert_eq!(history.undo(&mut image, &mut mask).as_deref(), Some("paint"));
        assert_eq!(image, solid(10));
        assert!(mask.is_empty());

        assert_eq!(history.redo(&mut image, &mut mask).as_deref(), Some("paint"));
        assert_eq!(image, after_image);
        assert_eq!(mask.as_gray(), after_mask.as_gray());
    }

    #[test]
    fn limit_evicts_oldest_first() {
        let mut history = HistoryManager::new(3);
        let mask = SelectionMask::new(4, 4);
        for i in 0..5u8 {
            history.push_undo(format!("step {i}"), &solid(i), &mask);
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(history.undo_history(), vec!["step 4", "step 3", "step 2"]);
    }

    #[test]
    fn push_clears_redo() {
        let mut history = HistoryManager::default();
        let mut image = solid(0);
        let mut mask = SelectionMask::new(4, 4);
        history.push_undo("a", &image, &mask);
        history.undo(&mut image, &mut mask);
        assert!(history.can_redo());
        history.push_undo("b", &image, &mask);
        assert!(!history.can_redo());
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn empty_stacks_are_noops() {
        let mut history = HistoryManager::default();
        let mut image = solid(7);
        let mut mask = SelectionMask::new(4, 4);
        assert!(history.undo(&mut image, &mut mask).is_none());
        assert!(history.redo(&mut image, &mut mask).is_none());
        assert!(!history.discard_redo());
        assert_eq!(image, solid(7));
    }

    #[test]
    fn shrinking_limit_prunes_and_memory_tracks() {
        let mut history = HistoryManager::new(10);
        let mask = SelectionMask::new(4, 4);
        for i in 0..6u8 {
            history.push_undo("x", &solid(i), &mask);
        }
        let per_entry = 4 * 4 * 4 + 4 * 4;
        assert_eq!(history.memory_usage(), 6 * per_entry);
        history.set_limit(2);
        assert_eq!(history.undo_count(), 2);
        assert_eq!(history.memory_usage(), 2 * per_entry);
        history.set_limit(0);
        assert_eq!(history.limit(), 1);
        history.clear();
        assert_eq!(history.memory_usage(), 0);
    }
}
