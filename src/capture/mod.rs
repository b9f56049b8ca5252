//! Capture-side inputs
//!
//! Media types delivered by capture sources, plus a synthetic source for
//! demos and tests.

pub mod synthetic;
pub mod traits;

pub use synthetic::{SyntheticConfig, SyntheticSource, VideoDelivery};
pub use traits::{MediaKind, MediaSample, MediaTime, PixelFormat, PixelFrame};
