//! Segmented recording coordinator
//!
//! Routes samples from the capture source into time-bounded segments,
//! rotates to a fresh segment writer at each boundary, and finalizes the
//! outgoing writer in the background.
//!
//! All changes to the current writer, the rotation boundary and the
//! in-flight registry happen under one ordering lock (`domain`). Appends
//! hold a read guard on `current`; a rotation takes the write guard while it
//! swaps writers and marks the old one finished, so deliveries on other
//! contexts wait for the swap instead of landing on a finished writer.

use super::registry::SegmentRegistry;
use super::rotation::{Cut, RotationController};
use super::state::{RecorderStats, RecordingState, SegmentPhase, SessionConfig};
use super::writer::{SegmentOutput, SegmentWriter, SegmentWriterFactory, WriterError};
use crate::capture::traits::{MediaKind, MediaSample, MediaTime, PixelFrame};
use crate::utils::error::{ErrorResponse, RecorderError, RecorderResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};

/// How a segment's finalize ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SegmentStatus {
    Finalized { location: PathBuf },
    Failed { error: ErrorResponse },
}

/// Notification sent once per segment when its finalize completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEvent {
    pub segment: SegmentOutput,
    #[serde(flatten)]
    pub status: SegmentStatus,
    pub completed_at: DateTime<Utc>,
}

impl SegmentEvent {
    pub fn is_success(&self) -> bool {
        matches!(self.status, SegmentStatus::Finalized { .. })
    }
}

/// Receives finished segments.
///
/// The listener takes over the segment's backing storage. It is held weakly:
/// once the owner drops it, completions fall back to removing the file.
pub trait SegmentListener: Send + Sync {
    fn segment_finalized(&self, event: &SegmentEvent);
}

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Recording started
    Started,
    /// Recording stopped
    Stopped,
    /// Recording paused
    Paused,
    /// Recording resumed
    Resumed,
    /// A new segment writer became current
    SegmentOpened(SegmentOutput),
    /// A boundary was crossed after the first segment
    SegmentRotated {
        previous: Option<SegmentOutput>,
        next: Option<SegmentOutput>,
    },
    /// A segment's finalize completed
    SegmentFinalized(SegmentEvent),
    /// Error occurred
    Error(String),
}

/// What happened to one routed sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not recording, or nothing decodable in the sample
    Ignored,
    Appended,
    /// No current writer, channel not ready, or append rejected
    Dropped,
}

#[derive(Default)]
struct Counters {
    opened: AtomicU64,
    rotations: AtomicU64,
    appended: AtomicU64,
    dropped: AtomicU64,
    finalized: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
}

/// State serialized by the ordering lock
struct Domain {
    config: SessionConfig,
    rotation: RotationController,
    registry: SegmentRegistry,
    /// Bumped by `clear()`; completions from older epochs skip the registry
    epoch: u64,
    next_index: u64,
}

struct Inner {
    state: RwLock<RecordingState>,
    domain: Mutex<Domain>,
    current: RwLock<Option<Arc<dyn SegmentWriter>>>,
    factory: Arc<dyn SegmentWriterFactory>,
    listener: RwLock<Option<Weak<dyn SegmentListener>>>,
    event_tx: broadcast::Sender<RecorderEvent>,
    counters: Counters,
    drained: Notify,
    runtime: Handle,
}

/// Splits a live recording into segments.
///
/// Cloning yields another handle to the same recorder, so each delivery
/// context can own one.
#[derive(Clone)]
pub struct SegmentedRecorder {
    inner: Arc<Inner>,
}

impl SegmentedRecorder {
    /// Create a recorder that finalizes segments on the current tokio runtime
    pub fn new(factory: Arc<dyn SegmentWriterFactory>) -> RecorderResult<Self> {
        let runtime = Handle::try_current().map_err(|_| RecorderError::NoRuntime)?;
        Ok(Self::with_runtime(factory, runtime))
    }

    pub fn with_runtime(factory: Arc<dyn SegmentWriterFactory>, runtime: Handle) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let config = SessionConfig::default();
        let rotation = RotationController::new(config.segment_duration());
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(RecordingState::Idle),
                domain: Mutex::new(Domain {
                    config,
                    rotation,
                    registry: SegmentRegistry::new(),
                    epoch: 0,
                    next_index: 0,
                }),
                current: RwLock::new(None),
                factory,
                listener: RwLock::new(None),
                event_tx,
                counters: Counters::default(),
                drained: Notify::new(),
                runtime,
            }),
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        *self.inner.state.read()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Register the listener for finished segments
    pub fn set_listener<L: SegmentListener + 'static>(&self, listener: &Arc<L>) {
        let weak = Arc::downgrade(listener);
        let weak: Weak<dyn SegmentListener> = weak;
        *self.inner.listener.write() = Some(weak);
    }

    pub fn clear_listener(&self) {
        *self.inner.listener.write() = None;
    }

    /// Next scheduled cut, if the session has seen video yet
    pub fn boundary(&self) -> Option<MediaTime> {
        self.inner.domain.lock().rotation.boundary()
    }

    /// Segments rotated out whose finalize has not completed
    pub fn pending_segments(&self) -> usize {
        self.inner.domain.lock().registry.len()
    }

    pub fn stats(&self) -> RecorderStats {
        let pending_segments = self.pending_segments();
        let c = &self.inner.counters;
        RecorderStats {
            segments_opened: c.opened.load(Ordering::SeqCst),
            rotations: c.rotations.load(Ordering::SeqCst),
            samples_appended: c.appended.load(Ordering::SeqCst),
            samples_dropped: c.dropped.load(Ordering::SeqCst),
            segments_finalized: c.finalized.load(Ordering::SeqCst),
            segments_failed: c.failed.load(Ordering::SeqCst),
            finalizations_in_flight: c.in_flight.load(Ordering::SeqCst),
            pending_segments,
        }
    }

    /// Start a recording session
    pub fn start(&self, config: SessionConfig) -> RecorderResult<()> {
        config.validate()?;

        let mut domain = self.inner.domain.lock();
        if self.inner.state.read().is_active() {
            return Err(RecorderError::AlreadyRecording);
        }

        tracing::info!(
            "Starting segmented recording: {}ms segments into {:?}",
            config.segment_duration_ms,
            config.output_dir
        );

        domain.rotation.set_segment_duration(config.segment_duration());
        domain.config = config;
        *self.inner.state.write() = RecordingState::Recording;
        drop(domain);

        self.inner.emit(RecorderEvent::Started);
        Ok(())
    }

    /// Stop recording.
    ///
    /// The current segment is handed off for finalization and no further
    /// rotations happen. Finalizations already running are not awaited.
    pub fn stop(&self) -> RecorderResult<RecorderStats> {
        let mut domain = self.inner.domain.lock();
        if !self.inner.state.read().is_active() {
            return Err(RecorderError::NotRecording);
        }

        *self.inner.state.write() = RecordingState::Idle;
        if let Some(last) = self.inner.swap_current(&mut domain, None) {
            tracing::debug!("Handed off final segment {}", last.index);
        }
        drop(domain);

        self.inner.emit(RecorderEvent::Stopped);
        let stats = self.stats();
        tracing::info!(
            "Recording stopped: {} segments opened, {} rotations, {} samples dropped",
            stats.segments_opened,
            stats.rotations,
            stats.samples_dropped
        );
        Ok(stats)
    }

    /// Pause recording; samples are ignored until `resume`
    pub fn pause(&self) -> RecorderResult<()> {
        let _domain = self.inner.domain.lock();
        if *self.inner.state.read() != RecordingState::Recording {
            return Err(RecorderError::NotRecording);
        }

        tracing::info!("Pausing recording");
        *self.inner.state.write() = RecordingState::Paused;
        self.inner.emit(RecorderEvent::Paused);
        Ok(())
    }

    /// Resume a paused recording
    pub fn resume(&self) -> RecorderResult<()> {
        let _domain = self.inner.domain.lock();
        if *self.inner.state.read() != RecordingState::Paused {
            return Err(RecorderError::NotRecording);
        }

        tracing::info!("Resuming recording");
        *self.inner.state.write() = RecordingState::Recording;
        self.inner.emit(RecorderEvent::Resumed);
        Ok(())
    }

    /// Reset session state so nothing leaks into the next recording.
    ///
    /// Only allowed while idle. Finalizations still running keep going and
    /// notify the listener if it is still alive, but are no longer tracked.
    pub fn clear(&self) -> RecorderResult<()> {
        let mut domain = self.inner.domain.lock();
        if self.inner.state.read().is_active() {
            tracing::error!("Ignoring clear() while a recording is in progress");
            self.inner.emit(RecorderEvent::Error(
                "clear() called while recording".to_string(),
            ));
            return Err(RecorderError::ClearWhileRecording);
        }

        domain.rotation.clear();
        domain.epoch += 1;
        let detached = domain.registry.clear();
        let dropped = self.inner.current.write().take();
        drop(domain);

        if let Some(writer) = dropped {
            tracing::warn!(
                "Dropping segment {} without finalizing",
                writer.output().index
            );
        }
        tracing::info!(
            "Cleared session state ({} pending finalizations detached)",
            detached
        );
        Ok(())
    }

    /// Route an encoded audio or video sample to the current segment
    pub fn route(&self, sample: &MediaSample) -> RouteOutcome {
        if !sample.has_data() {
            return RouteOutcome::Ignored;
        }
        self.inner
            .deliver(sample.kind, sample.pts, |writer| writer.append_sample(sample))
    }

    /// Route a raw frame to the current segment's pixel-frame adaptor
    pub fn route_pixel_frame(&self, frame: &PixelFrame) -> RouteOutcome {
        if !frame.has_data() {
            return RouteOutcome::Ignored;
        }
        self.inner
            .deliver(MediaKind::Video, frame.pts, |writer| writer.append_pixel_frame(frame))
    }

    /// Wait until every scheduled finalize has completed and notified,
    /// including those detached by `clear()`
    pub async fn wait_for_finalizations(&self) {
        loop {
            let drained = self.inner.drained.notified();
            if self.inner.counters.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl Inner {
    fn emit(&self, event: RecorderEvent) {
        let _ = self.event_tx.send(event);
    }

    fn deliver<F>(self: &Arc<Self>, kind: MediaKind, pts: MediaTime, append: F) -> RouteOutcome
    where
        F: FnOnce(&dyn SegmentWriter) -> Result<(), WriterError>,
    {
        if *self.state.read() != RecordingState::Recording {
            return RouteOutcome::Ignored;
        }

        let current = {
            let mut domain = self.domain.lock();
            if *self.state.read() != RecordingState::Recording {
                return RouteOutcome::Ignored;
            }
            if let Some(cut) = domain.rotation.observe(pts, kind) {
                self.cut_over(&mut domain, cut, pts);
            }
            // Taken before the ordering lock is released, so no rotation can
            // slip in between the decision and the append.
            self.current.read()
        };

        let Some(writer) = current.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Dropped {} sample at {}: no active segment", kind, pts);
            return RouteOutcome::Dropped;
        };

        if !writer.is_ready(kind) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Dropped {} sample at {}: channel not ready", kind, pts);
            return RouteOutcome::Dropped;
        }

        match append(writer.as_ref()) {
            Ok(()) => {
                self.counters.appended.fetch_add(1, Ordering::Relaxed);
                RouteOutcome::Appended
            }
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropped {} sample at {}: {}", kind, pts, e);
                RouteOutcome::Dropped
            }
        }
    }

    /// Open the next segment and hand the previous one off
    fn cut_over(self: &Arc<Self>, domain: &mut Domain, cut: Cut, pts: MediaTime) {
        let index = domain.next_index;
        domain.next_index += 1;

        let next = match self.factory.create(index, &domain.config) {
            Ok(writer) => {
                self.counters.opened.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "Opened segment {} at {} -> {:?}",
                    index,
                    pts,
                    writer.output().location
                );
                Some(writer)
            }
            Err(e) => {
                tracing::error!("Failed to create writer for segment {}: {}", index, e);
                self.emit(RecorderEvent::Error(format!(
                    "Failed to create segment {index}: {e}"
                )));
                None
            }
        };

        let next_output = next.as_ref().map(|writer| writer.output().clone());
        let previous = self.swap_current(domain, next);

        if let Some(output) = &next_output {
            self.emit(RecorderEvent::SegmentOpened(output.clone()));
        }
        if cut == Cut::Rotate {
            self.counters.rotations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Rotated at {}: {:?} -> {:?}, next boundary {:?}",
                pts,
                previous.as_ref().map(|o| o.index),
                next_output.as_ref().map(|o| o.index),
                domain.rotation.boundary()
            );
            self.emit(RecorderEvent::SegmentRotated {
                previous,
                next: next_output,
            });
        }
    }

    /// Replace the current writer. The outgoing writer is registered and
    /// stops taking input while the write guard is held, then finalizes.
    fn swap_current(
        self: &Arc<Self>,
        domain: &mut Domain,
        next: Option<Arc<dyn SegmentWriter>>,
    ) -> Option<SegmentOutput> {
        let previous = {
            let mut current = self.current.write();
            let previous = std::mem::replace(&mut *current, next);
            if let Some(writer) = &previous {
                let id = writer.output().id;
                domain.registry.insert(writer.clone());
                writer.mark_finished(MediaKind::Audio);
                writer.mark_finished(MediaKind::Video);
                domain.registry.advance(&id, SegmentPhase::StoppingInput);
            }
            previous
        }?;

        let output = previous.output().clone();
        self.schedule_finalize(domain, previous);
        Some(output)
    }

    fn schedule_finalize(self: &Arc<Self>, domain: &mut Domain, writer: Arc<dyn SegmentWriter>) {
        let id = writer.output().id;
        domain.registry.advance(&id, SegmentPhase::Finalizing);
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(self);
        let epoch = domain.epoch;
        self.runtime.spawn(async move {
            let result = writer.finalize().await;
            let output = writer.output().clone();
            drop(writer);
            inner.complete_finalize(output, epoch, result).await;
        });
    }

    async fn complete_finalize(
        &self,
        output: SegmentOutput,
        epoch: u64,
        result: Result<PathBuf, WriterError>,
    ) {
        {
            let mut domain = self.domain.lock();
            if domain.epoch != epoch {
                tracing::debug!(
                    "Segment {} finished after its session was cleared",
                    output.index
                );
            } else {
                match domain.registry.remove(&output.id) {
                    Some(entry) => tracing::debug!(
                        "Segment {} {:?} after {}ms in flight",
                        output.index,
                        entry.phase,
                        (Utc::now() - entry.handed_off_at).num_milliseconds()
                    ),
                    None => {
                        tracing::warn!("Segment {} was not pending finalization", output.index)
                    }
                }
            }
        }

        let status = match result {
            Ok(location) => {
                self.counters.finalized.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Finalized segment {} at {:?}", output.index, location);
                SegmentStatus::Finalized { location }
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Failed to finalize segment {}: {}", output.index, e);
                SegmentStatus::Failed { error: e.into() }
            }
        };
        let event = SegmentEvent {
            segment: output,
            status,
            completed_at: Utc::now(),
        };

        let listener = self.listener.read().as_ref().and_then(Weak::upgrade);
        match listener {
            Some(listener) => listener.segment_finalized(&event),
            None => dispose_unclaimed(&event).await,
        }
        self.emit(RecorderEvent::SegmentFinalized(event));

        if self.counters.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Best-effort removal of a segment nobody is listening for
async fn dispose_unclaimed(event: &SegmentEvent) {
    let path = match &event.status {
        SegmentStatus::Finalized { location } => location,
        SegmentStatus::Failed { .. } => &event.segment.location,
    };
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed unclaimed segment {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove unclaimed segment {:?}: {}", path, e),
    }
}
