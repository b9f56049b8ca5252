//! Test doubles for the segment writer seam

use super::coordinator::{SegmentEvent, SegmentListener};
use super::state::SessionConfig;
use super::writer::{SegmentOutput, SegmentWriter, SegmentWriterFactory, WriterError};
use crate::capture::traits::{MediaKind, MediaSample, MediaTime, PixelFrame};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct MockWriter {
    output: SegmentOutput,
    audio_finished: AtomicBool,
    video_finished: AtomicBool,
    video_ready: AtomicBool,
    pub appended: Mutex<Vec<(MediaKind, MediaTime)>>,
    pub pixel_frames: AtomicUsize,
    pub rejected: AtomicUsize,
    pub finalize_calls: AtomicUsize,
    fail_finalize: bool,
    gate: Option<Arc<Semaphore>>,
}

impl MockWriter {
    pub fn new(index: u64) -> Arc<Self> {
        Arc::new(Self::build(index, false, None))
    }

    fn build(index: u64, fail_finalize: bool, gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            output: SegmentOutput::new(index, PathBuf::from(format!("mock-{index}.seg"))),
            audio_finished: AtomicBool::new(false),
            video_finished: AtomicBool::new(false),
            video_ready: AtomicBool::new(true),
            appended: Mutex::new(Vec::new()),
            pixel_frames: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
            finalize_calls: AtomicUsize::new(0),
            fail_finalize,
            gate,
        }
    }

    fn finished(&self, channel: MediaKind) -> &AtomicBool {
        match channel {
            MediaKind::Audio => &self.audio_finished,
            MediaKind::Video => &self.video_finished,
        }
    }

    pub fn is_finished(&self, channel: MediaKind) -> bool {
        self.finished(channel).load(Ordering::SeqCst)
    }

    pub fn set_video_ready(&self, ready: bool) {
        self.video_ready.store(ready, Ordering::SeqCst);
    }

    pub fn appended_count(&self, kind: MediaKind) -> usize {
        self.appended.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    fn check_open(&self, channel: MediaKind) -> Result<(), WriterError> {
        if self.is_finished(channel) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(WriterError::Finished(channel));
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentWriter for MockWriter {
    fn output(&self) -> &SegmentOutput {
        &self.output
    }

    fn is_ready(&self, channel: MediaKind) -> bool {
        let ready = match channel {
            MediaKind::Audio => true,
            MediaKind::Video => self.video_ready.load(Ordering::SeqCst),
        };
        ready && !self.is_finished(channel)
    }

    fn append_sample(&self, sample: &MediaSample) -> Result<(), WriterError> {
        self.check_open(sample.kind)?;
        self.appended.lock().push((sample.kind, sample.pts));
        Ok(())
    }

    fn append_pixel_frame(&self, frame: &PixelFrame) -> Result<(), WriterError> {
        self.check_open(MediaKind::Video)?;
        self.pixel_frames.fetch_add(1, Ordering::SeqCst);
        self.appended.lock().push((MediaKind::Video, frame.pts));
        Ok(())
    }

    fn mark_finished(&self, channel: MediaKind) {
        self.finished(channel).store(true, Ordering::SeqCst);
    }

    async fn finalize(&self) -> Result<PathBuf, WriterError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| WriterError::Finalize(e.to_string()))?;
        }
        if self.fail_finalize {
            return Err(WriterError::Finalize("mock failure".to_string()));
        }
        Ok(self.output.location.clone())
    }
}

/// Factory handing out `MockWriter`s and remembering each one
#[derive(Default)]
pub struct MockFactory {
    pub writers: Mutex<Vec<Arc<MockWriter>>>,
    failing_indices: Mutex<HashSet<u64>>,
    fail_finalize: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make construction of the writer with this index fail
    pub fn fail_create(&self, index: u64) {
        self.failing_indices.lock().insert(index);
    }

    pub fn fail_finalize(&self) {
        self.fail_finalize.store(true, Ordering::SeqCst);
    }

    /// Hold every finalize until the returned semaphore gets a permit
    pub fn gate_finalize(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn writer(&self, position: usize) -> Arc<MockWriter> {
        self.writers.lock()[position].clone()
    }

    pub fn created(&self) -> usize {
        self.writers.lock().len()
    }
}

impl SegmentWriterFactory for MockFactory {
    fn create(
        &self,
        index: u64,
        _config: &SessionConfig,
    ) -> Result<Arc<dyn SegmentWriter>, WriterError> {
        if self.failing_indices.lock().contains(&index) {
            return Err(WriterError::Open {
                path: PathBuf::from(format!("mock-{index}.seg")),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mock"),
            });
        }
        let writer = Arc::new(MockWriter::build(
            index,
            self.fail_finalize.load(Ordering::SeqCst),
            self.gate.lock().clone(),
        ));
        self.writers.lock().push(writer.clone());
        Ok(writer)
    }
}

/// Listener collecting every notification
#[derive(Default)]
pub struct CollectingListener {
    pub events: Mutex<Vec<SegmentEvent>>,
}

impl SegmentListener for CollectingListener {
    fn segment_finalized(&self, event: &SegmentEvent) {
        self.events.lock().push(event.clone());
    }
}
