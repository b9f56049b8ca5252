//! Segmented recording engine
//!
//! This module implements segment rotation for live recordings:
//! - SegmentWriter trait wrapping one output container
//! - RotationController deciding when a segment ends
//! - SegmentRegistry tracking segments until they are finalized
//! - SegmentedRecorder routing samples and driving finalization

pub mod coordinator;
pub mod file_writer;
pub mod registry;
pub mod rotation;
pub mod state;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{
    RecorderEvent, RouteOutcome, SegmentEvent, SegmentListener, SegmentStatus, SegmentedRecorder,
};
pub use file_writer::{read_segment, FileSegmentWriter, FileSegmentWriterFactory};
pub use state::{RecorderStats, RecordingState, SegmentPhase, SessionConfig};
pub use writer::{SegmentOutput, SegmentWriter, SegmentWriterFactory, WriterError};
