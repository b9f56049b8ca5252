//! Records synthetic capture input into segment files.
//!
//! Usage: `segment-recorder [session.json]`

use anyhow::Context;
use segment_recorder::capture::{SyntheticConfig, SyntheticSource};
use segment_recorder::recorder::{
    read_segment, FileSegmentWriterFactory, SegmentEvent, SegmentListener, SegmentStatus,
    SegmentedRecorder, SessionConfig,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Logs each finished segment and leaves it on disk
struct SegmentLog;

impl SegmentListener for SegmentLog {
    fn segment_finalized(&self, event: &SegmentEvent) {
        let index = event.segment.index;
        match &event.status {
            SegmentStatus::Finalized { location } => match read_segment(location) {
                Ok(contents) => tracing::info!(
                    "Segment {} ready at {:?} ({} records)",
                    index,
                    location,
                    contents.records.len()
                ),
                Err(e) => tracing::warn!("Segment {} at {:?} is unreadable: {}", index, location, e),
            },
            SegmentStatus::Failed { error } => {
                tracing::error!("Segment {} failed [{}]: {}", index, error.code, error.message)
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    segment_recorder::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => SessionConfig::load(Path::new(&path))
            .with_context(|| format!("Failed to load session config from {path}"))?,
        None => SessionConfig {
            segment_duration_ms: 2_000,
            ..SessionConfig::default()
        },
    };

    let recorder = SegmentedRecorder::new(Arc::new(FileSegmentWriterFactory))?;
    let listener = Arc::new(SegmentLog);
    recorder.set_listener(&listener);
    recorder.start(config.clone())?;

    let mut source = SyntheticSource::new(SyntheticConfig {
        duration: config.segment_duration() * 3 + Duration::from_millis(500),
        realtime: config.realtime,
        ..SyntheticConfig::default()
    });
    source.start(recorder.clone())?;
    let appended = source.wait().await;

    recorder.stop()?;
    recorder.wait_for_finalizations().await;
    recorder.clear()?;

    tracing::info!("Recorded {} samples into {:?}", appended, config.output_dir);
    println!("{}", serde_json::to_string_pretty(&recorder.stats())?);
    Ok(())
}
