//! Segment Recorder - time-bounded segments from a live capture stream.
//!
//! Audio and video samples are routed into a sequence of independent
//! segments. A new segment starts every fixed duration, and finished
//! segments are finalized in the background without stalling capture.

pub mod capture;
pub mod recorder;
pub mod utils;

pub use capture::{MediaKind, MediaSample, MediaTime, PixelFrame};
pub use recorder::{
    RecorderEvent, SegmentEvent, SegmentListener, SegmentedRecorder, SessionConfig,
};
pub use utils::error::{RecorderError, RecorderResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segment_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Segment Recorder v{}", env!("CARGO_PKG_VERSION"));
}
