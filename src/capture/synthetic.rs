//! Synthetic capture source
//!
//! Stands in for a capture device: audio packets and video frames are
//! generated on independent tokio tasks and routed into a recorder, either
//! paced in real time or as fast as the recorder accepts them.

use super::traits::{MediaSample, MediaTime, PixelFormat, PixelFrame};
use crate::recorder::coordinator::{RouteOutcome, SegmentedRecorder};
use crate::utils::error::{RecorderError, RecorderResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tick rate used for generated video timestamps
pub const VIDEO_TIMESCALE: i32 = 600;

/// How generated video reaches the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoDelivery {
    /// Encoded samples through `route`
    Encoded,
    /// Raw BGRA frames through `route_pixel_frame`
    PixelFrames,
}

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub fps: u32,
    pub audio_sample_rate: u32,
    pub audio_frames_per_packet: u32,
    pub video: VideoDelivery,
    pub width: u32,
    pub height: u32,
    /// Amount of media time to generate
    pub duration: Duration,
    /// Pace delivery against the wall clock
    pub realtime: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            audio_sample_rate: 48_000,
            audio_frames_per_packet: 1024,
            video: VideoDelivery::Encoded,
            width: 320,
            height: 180,
            duration: Duration::from_secs(10),
            realtime: true,
        }
    }
}

/// Drives generated samples into a recorder
pub struct SyntheticSource {
    config: SyntheticConfig,
    is_running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<u64>>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Spawn the audio and video delivery tasks
    pub fn start(&mut self, recorder: SegmentedRecorder) -> RecorderResult<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::AlreadyRecording);
        }
        if self.config.fps == 0 || self.config.audio_sample_rate == 0 {
            self.is_running.store(false, Ordering::SeqCst);
            return Err(RecorderError::InvalidConfig(
                "synthetic source needs a non-zero frame rate and sample rate".to_string(),
            ));
        }
        if self.config.video == VideoDelivery::PixelFrames
            && PixelFormat::Bgra
                .frame_size(self.config.width, self.config.height)
                .is_none()
        {
            self.is_running.store(false, Ordering::SeqCst);
            return Err(RecorderError::InvalidConfig(format!(
                "{}x{} frames are too large to generate",
                self.config.width, self.config.height
            )));
        }

        self.handles.push(self.spawn_audio(recorder.clone()));
        self.handles.push(self.spawn_video(recorder));

        tracing::info!(
            "Synthetic capture started: {}fps {:?} video, {}Hz audio, {:?} of media",
            self.config.fps,
            self.config.video,
            self.config.audio_sample_rate,
            self.config.duration
        );
        Ok(())
    }

    /// Wait for every delivery task to finish, returning how many samples
    /// the recorder accepted
    pub async fn wait(&mut self) -> u64 {
        let mut appended = 0;
        for handle in self.handles.drain(..) {
            match handle.await {
                Ok(count) => appended += count,
                Err(e) => tracing::warn!("Synthetic delivery task failed: {}", e),
            }
        }
        self.is_running.store(false, Ordering::SeqCst);
        appended
    }

    /// Stop generating samples early
    pub async fn stop(&mut self) -> u64 {
        self.is_running.store(false, Ordering::SeqCst);
        self.wait().await
    }

    fn spawn_audio(&self, recorder: SegmentedRecorder) -> JoinHandle<u64> {
        let is_running = self.is_running.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let rate = config.audio_sample_rate as i64;
            let per_packet = config.audio_frames_per_packet.max(1) as i64;
            let packets = config.duration.as_millis() as i64 * rate / (1000 * per_packet);
            let mut ticker = tokio::time::interval(Duration::from_secs_f64(
                per_packet as f64 / rate as f64,
            ));

            let mut appended = 0;
            for packet in 0..packets {
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
                pace(&mut ticker, config.realtime).await;

                let pts = MediaTime::new(packet * per_packet, config.audio_sample_rate as i32);
                // 16-bit stereo silence
                let sample = MediaSample::audio(pts, vec![0; per_packet as usize * 4]);
                if recorder.route(&sample) == RouteOutcome::Appended {
                    appended += 1;
                }
            }
            appended
        })
    }

    fn spawn_video(&self, recorder: SegmentedRecorder) -> JoinHandle<u64> {
        let is_running = self.is_running.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let fps = config.fps as i64;
            let frames = config.duration.as_millis() as i64 * fps / 1000;
            let frame_size = PixelFormat::Bgra
                .frame_size(config.width, config.height)
                .unwrap_or_default();
            let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));

            let mut appended = 0;
            for frame in 0..frames {
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
                pace(&mut ticker, config.realtime).await;

                let pts = MediaTime::new(frame * VIDEO_TIMESCALE as i64 / fps, VIDEO_TIMESCALE);
                let outcome = match config.video {
                    VideoDelivery::Encoded => recorder.route(&MediaSample::video(
                        pts,
                        vec![(frame % 256) as u8; 64],
                    )),
                    VideoDelivery::PixelFrames => recorder.route_pixel_frame(&PixelFrame {
                        width: config.width,
                        height: config.height,
                        format: PixelFormat::Bgra,
                        pts,
                        data: vec![0; frame_size],
                    }),
                };
                if outcome == RouteOutcome::Appended {
                    appended += 1;
                }

                if frame > 0 && frame % (fps * 5) == 0 {
                    tracing::debug!("Generated {} frames ({:.1}s)", frame, pts.as_secs_f64());
                }
            }
            appended
        })
    }
}

async fn pace(ticker: &mut tokio::time::Interval, realtime: bool) {
    if realtime {
        ticker.tick().await;
    } else {
        tokio::task::yield_now().await;
    }
}
