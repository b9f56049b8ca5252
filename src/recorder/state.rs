//! Recording state management
//!
//! Defines the session state machine, the per-segment finalization phases,
//! and the configuration a recording session is started with.

use crate::utils::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Samples are being routed into segments
    Recording,
    /// Recording is paused, incoming samples are ignored
    Paused,
}

impl RecordingState {
    /// Whether a session is open (recording or paused)
    pub fn is_active(&self) -> bool {
        !matches!(self, RecordingState::Idle)
    }
}

/// Lifecycle of one segment from cut-over to durable close.
///
/// Phases advance strictly in order; a failed finalize still ends in
/// `Finalized`, carrying the error in its notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentPhase {
    Active,
    StoppingInput,
    Finalizing,
    Finalized,
}

impl SegmentPhase {
    /// The only phase this one may move to
    pub fn next(&self) -> Option<SegmentPhase> {
        match self {
            SegmentPhase::Active => Some(SegmentPhase::StoppingInput),
            SegmentPhase::StoppingInput => Some(SegmentPhase::Finalizing),
            SegmentPhase::Finalizing => Some(SegmentPhase::Finalized),
            SegmentPhase::Finalized => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
    Pcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

/// How frames are fitted into the output dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalingMode {
    AspectFit,
    AspectFill,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoProfile {
    Baseline,
    Main,
    High,
}

/// Audio encoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    pub codec: AudioCodec,
    pub channels: u16,
    /// Bits per second
    pub bitrate: u32,
    /// Samples per second
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Aac,
            channels: 2,
            bitrate: 128_000,
            sample_rate: 48_000,
        }
    }
}

/// Video encoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub scaling_mode: ScalingMode,
    /// Maximum frames between keyframes
    pub keyframe_interval: u32,
    pub profile: VideoProfile,
    /// Bits per second
    pub bitrate: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            width: 1920,
            height: 1080,
            scaling_mode: ScalingMode::AspectFit,
            keyframe_interval: 60,
            profile: VideoProfile::High,
            bitrate: 6_000_000,
        }
    }
}

/// Configuration for starting a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Length of each segment in milliseconds
    pub segment_duration_ms: u64,

    /// Whether samples arrive from a live source
    pub realtime: bool,

    /// Directory segment writers place their output in
    pub output_dir: PathBuf,

    pub audio: AudioSettings,

    pub video: VideoSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            segment_duration_ms: 6_000,
            realtime: true,
            output_dir: std::env::temp_dir().join("segment-recorder"),
            audio: AudioSettings::default(),
            video: VideoSettings::default(),
        }
    }
}

impl SessionConfig {
    /// Read a session configuration from a JSON file
    pub fn load(path: &Path) -> RecorderResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded session config from {:?}", path);
        Ok(config)
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_millis(self.segment_duration_ms)
    }

    /// Reject settings no segment writer could honor
    pub fn validate(&self) -> RecorderResult<()> {
        if self.segment_duration_ms == 0 {
            return Err(RecorderError::InvalidConfig(
                "segment duration must be greater than zero".to_string(),
            ));
        }
        if self.audio.channels == 0 || self.audio.sample_rate == 0 {
            return Err(RecorderError::InvalidConfig(
                "audio channels and sample rate must be non-zero".to_string(),
            ));
        }
        if self.video.width == 0 || self.video.height == 0 {
            return Err(RecorderError::InvalidConfig(format!(
                "invalid video dimensions {}x{}",
                self.video.width, self.video.height
            )));
        }
        if self.video.keyframe_interval == 0 {
            return Err(RecorderError::InvalidConfig(
                "keyframe interval must be at least one frame".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of recorder counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStats {
    /// Segment writers successfully created
    pub segments_opened: u64,
    /// Boundary crossings after the first segment was opened
    pub rotations: u64,
    pub samples_appended: u64,
    pub samples_dropped: u64,
    pub segments_finalized: u64,
    pub segments_failed: u64,
    /// Finalizations scheduled but not yet completed
    pub finalizations_in_flight: u64,
    /// Segments currently tracked by the in-flight registry
    pub pending_segments: usize,
}
