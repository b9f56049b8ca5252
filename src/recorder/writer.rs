//! Segment writer abstraction
//!
//! A segment writer wraps one output container: it accepts samples on an
//! audio and a video channel (plus raw pixel frames bound to the video
//! channel), reports per-channel readiness, and finalizes asynchronously
//! once both channels are marked finished.

use super::state::SessionConfig;
use crate::capture::traits::{MediaKind, MediaSample, PixelFrame};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by segment writers
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open segment output {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} channel no longer accepts input")]
    Finished(MediaKind),

    #[error("Finalize failed: {0}")]
    Finalize(String),
}

/// Identity of one segment's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentOutput {
    /// Unique segment identity
    pub id: Uuid,

    /// Position of the segment within the recorder's lifetime
    pub index: u64,

    /// Where the container is written
    pub location: PathBuf,

    pub opened_at: DateTime<Utc>,
}

impl SegmentOutput {
    pub fn new(index: u64, location: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            location,
            opened_at: Utc::now(),
        }
    }
}

/// One output container's lifecycle.
///
/// Appends arrive concurrently from the audio and video delivery contexts,
/// so every method takes `&self`. After `mark_finished` a channel must
/// report not-ready and reject further appends.
#[async_trait]
pub trait SegmentWriter: Send + Sync {
    fn output(&self) -> &SegmentOutput;

    /// Whether `channel` can take more data without blocking
    fn is_ready(&self, channel: MediaKind) -> bool;

    /// Append an encoded sample to the channel matching its kind
    fn append_sample(&self, sample: &MediaSample) -> Result<(), WriterError>;

    /// Append a raw frame through the pixel-frame adaptor of the video channel
    fn append_pixel_frame(&self, frame: &PixelFrame) -> Result<(), WriterError>;

    /// Stop accepting input on `channel`
    fn mark_finished(&self, channel: MediaKind);

    /// Durably close the container, yielding its final location
    async fn finalize(&self) -> Result<PathBuf, WriterError>;
}

/// Creates the writer for each new segment
pub trait SegmentWriterFactory: Send + Sync {
    fn create(
        &self,
        index: u64,
        config: &SessionConfig,
    ) -> Result<Arc<dyn SegmentWriter>, WriterError>;
}
