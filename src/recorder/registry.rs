//! Registry of in-flight segments
//!
//! Holds the recorder's strong reference to every segment between cut-over
//! and finalize completion. Removing an entry is the point where ownership of
//! the writer is released.

use super::state::SegmentPhase;
use super::writer::SegmentWriter;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A segment waiting for its finalize to complete
pub struct PendingSegment {
    pub writer: Arc<dyn SegmentWriter>,
    pub phase: SegmentPhase,
    pub handed_off_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SegmentRegistry {
    entries: HashMap<Uuid, PendingSegment>,
}

impl SegmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a segment that was just rotated out. Returns false if it is
    /// already tracked.
    pub fn insert(&mut self, writer: Arc<dyn SegmentWriter>) -> bool {
        let id = writer.output().id;
        if self.entries.contains_key(&id) {
            tracing::warn!("Segment {} is already pending finalization", id);
            return false;
        }
        self.entries.insert(
            id,
            PendingSegment {
                writer,
                phase: SegmentPhase::Active,
                handed_off_at: Utc::now(),
            },
        );
        true
    }

    /// Move a tracked segment to `phase`, which must directly follow its
    /// current phase. `Finalized` is reached through `remove` only.
    pub fn advance(&mut self, id: &Uuid, phase: SegmentPhase) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        if phase == SegmentPhase::Finalized || entry.phase.next() != Some(phase) {
            tracing::warn!(
                "Rejected phase change for segment {}: {:?} -> {:?}",
                id,
                entry.phase,
                phase
            );
            return false;
        }
        entry.phase = phase;
        true
    }

    pub fn phase(&self, id: &Uuid) -> Option<SegmentPhase> {
        self.entries.get(id).map(|entry| entry.phase)
    }

    /// Drop the entry for a segment whose finalize completed. The returned
    /// entry is in its terminal `Finalized` phase.
    pub fn remove(&mut self, id: &Uuid) -> Option<PendingSegment> {
        let mut entry = self.entries.remove(id)?;
        if entry.phase.next() != Some(SegmentPhase::Finalized) {
            tracing::warn!(
                "Segment {} completed from phase {:?}",
                id,
                entry.phase
            );
        }
        entry.phase = SegmentPhase::Finalized;
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every tracked segment, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::testing::MockWriter;

    #[test]
    fn test_insert_and_remove_once() {
        let mut registry = SegmentRegistry::new();
        let writer = MockWriter::new(0);
        let id = writer.output().id;

        assert!(registry.insert(writer.clone()));
        assert!(!registry.insert(writer));
        assert_eq!(registry.len(), 1);

        assert!(registry.advance(&id, SegmentPhase::StoppingInput));
        assert!(registry.advance(&id, SegmentPhase::Finalizing));
        let entry = registry.remove(&id).unwrap();
        assert_eq!(entry.phase, SegmentPhase::Finalized);
        assert_eq!(registry.phase(&id), None);
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut registry = SegmentRegistry::new();
        let writer = MockWriter::new(3);
        let id = writer.output().id;
        registry.insert(writer);

        assert!(!registry.advance(&id, SegmentPhase::Finalizing));
        assert_eq!(registry.phase(&id), Some(SegmentPhase::Active));
        assert!(registry.advance(&id, SegmentPhase::StoppingInput));
        assert!(!registry.advance(&id, SegmentPhase::StoppingInput));
        assert!(registry.advance(&id, SegmentPhase::Finalizing));
        assert!(!registry.advance(&id, SegmentPhase::Finalized));
    }

    #[test]
    fn test_clear_drops_all_entries() {
        let mut registry = SegmentRegistry::new();
        registry.insert(MockWriter::new(0));
        registry.insert(MockWriter::new(1));
        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
    }
}
