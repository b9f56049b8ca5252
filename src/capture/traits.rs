//! Capture-side media types
//!
//! Platform-agnostic description of what a capture source delivers:
//! timestamped audio/video samples and raw pixel frames.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Audio vs. video classification of an incoming sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// A presentation timestamp expressed as `value / timescale` seconds.
///
/// Comparisons are exact across different timescales, so `MediaTime::new(1, 2)`
/// equals `MediaTime::new(300, 600)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaTime {
    /// Tick count
    pub value: i64,

    /// Ticks per second
    pub timescale: i32,
}

impl MediaTime {
    pub const fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    /// A timestamp is usable only with a positive timescale
    pub fn is_valid(&self) -> bool {
        self.timescale > 0
    }

    /// Convert into another tick rate, rounding toward negative infinity.
    pub fn rescale(self, timescale: i32) -> Self {
        if timescale == self.timescale || !self.is_valid() || timescale <= 0 {
            return Self::new(self.value, self.timescale);
        }
        let ticks = (self.value as i128 * timescale as i128).div_euclid(self.timescale as i128);
        Self::new(clamp_ticks(ticks), timescale)
    }

    /// Move forward by exactly `duration`.
    ///
    /// The result uses the smallest tick rate that represents this time,
    /// `timescale` and `duration` without rounding. When no such rate fits
    /// in an `i32`, the result is expressed in `timescale` and rounded up.
    pub fn advance_by(self, duration: Duration, timescale: i32) -> Self {
        if !self.is_valid() || timescale <= 0 {
            return self;
        }

        let nanos = duration.as_nanos() as i128;
        let divisor = gcd(nanos, NANOS_PER_SEC);
        let (step, step_scale) = (nanos / divisor, NANOS_PER_SEC / divisor);

        let own = self.timescale as i128;
        let common = lcm(lcm(own, timescale as i128), step_scale);
        if let Ok(common_scale) = i32::try_from(common) {
            let ticks = self.value as i128 * (common / own) + step * (common / step_scale);
            return Self::new(clamp_ticks(ticks), common_scale);
        }

        let target = timescale as i128;
        let ticks = div_ceil(self.value as i128 * target, own) + div_ceil(nanos * target, NANOS_PER_SEC);
        Self::new(clamp_ticks(ticks), timescale)
    }

    pub fn as_secs_f64(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }

    fn cross(&self, other: &MediaTime) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

const NANOS_PER_SEC: i128 = 1_000_000_000;

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs().max(1)
}

fn lcm(a: i128, b: i128) -> i128 {
    a / gcd(a, b) * b
}

fn div_ceil(value: i128, divisor: i128) -> i128 {
    -(-value).div_euclid(divisor)
}

fn clamp_ticks(ticks: i128) -> i64 {
    ticks.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.cross(other);
        a == b
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.cross(other);
        a.cmp(&b)
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s ({}/{})", self.as_secs_f64(), self.value, self.timescale)
    }
}

/// An encoded audio or video sample delivered by the capture source
#[derive(Debug, Clone)]
pub struct MediaSample {
    /// Media kind of the payload
    pub kind: MediaKind,

    /// Presentation timestamp
    pub pts: MediaTime,

    /// Sample payload
    pub data: Vec<u8>,
}

impl MediaSample {
    pub fn audio(pts: MediaTime, data: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Audio,
            pts,
            data,
        }
    }

    pub fn video(pts: MediaTime, data: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Video,
            pts,
            data,
        }
    }

    /// Whether the sample carries anything a writer could decode
    pub fn has_data(&self) -> bool {
        !self.data.is_empty() && self.pts.is_valid()
    }
}

/// Pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Bgra,
    Nv12,
    Yuv420p,
}

impl PixelFormat {
    /// Expected buffer size for a frame of the given dimensions, or `None`
    /// when it does not fit in memory
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Bgra => pixels.checked_mul(4),
            PixelFormat::Nv12 | PixelFormat::Yuv420p => Some(pixels.checked_mul(3)? / 2),
        }
    }
}

/// A raw, uncompressed video frame
#[derive(Debug, Clone)]
pub struct PixelFrame {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Pixel layout of `data`
    pub format: PixelFormat,

    /// Presentation timestamp
    pub pts: MediaTime,

    /// Raw pixel data
    pub data: Vec<u8>,
}

impl PixelFrame {
    /// Whether the frame holds a complete image with a usable timestamp
    pub fn has_data(&self) -> bool {
        self.pts.is_valid()
            && !self.data.is_empty()
            && self
                .format
                .frame_size(self.width, self.height)
                .is_some_and(|size| self.data.len() >= size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_across_timescales() {
        assert_eq!(MediaTime::new(1, 2), MediaTime::new(300, 600));
        assert!(MediaTime::new(601, 600) > MediaTime::new(48_000, 48_000));
        assert!(MediaTime::new(47_999, 48_000) < MediaTime::new(1, 1));
    }

    #[test]
    fn test_rescale_rounds_down() {
        let t = MediaTime::new(1001, 1000).rescale(600);
        assert_eq!(t.value, 600);
        assert_eq!(t.timescale, 600);

        let negative = MediaTime::new(-1, 1000).rescale(10);
        assert_eq!(negative.value, -1);
    }

    #[test]
    fn test_advance_by_is_exact_across_timescales() {
        let boundary = MediaTime::new(4, 3);
        let next = boundary.advance_by(Duration::from_secs(1), 1);
        assert_eq!(next, MediaTime::new(7, 3));
        assert_eq!(next.timescale, 3);

        let next = MediaTime::new(1200, 600).advance_by(Duration::from_secs(2), 90_000);
        assert_eq!(next, MediaTime::new(360_000, 90_000));
        assert_eq!(next.timescale, 90_000);
    }

    #[test]
    fn test_advance_by_sub_tick_duration() {
        let next = MediaTime::new(0, 1).advance_by(Duration::from_millis(500), 1);
        assert_eq!(next, MediaTime::new(1, 2));
        assert!(next > MediaTime::new(0, 1));
    }

    #[test]
    fn test_advance_by_rounds_up_without_exact_rate() {
        // A nanosecond step against a large prime rate has no common i32 rate
        let start = MediaTime::new(0, 2_147_483_647);
        let next = start.advance_by(Duration::from_nanos(1), 2_147_483_647);
        assert_eq!(next.timescale, 2_147_483_647);
        assert_eq!(next.value, 3);
        assert!(next > start);
    }

    #[test]
    fn test_sample_without_data() {
        assert!(!MediaSample::audio(MediaTime::new(0, 48_000), vec![]).has_data());
        assert!(!MediaSample::video(MediaTime::new(0, 0), vec![1]).has_data());
        assert!(MediaSample::video(MediaTime::new(0, 600), vec![1]).has_data());
    }

    #[test]
    fn test_pixel_frame_size_check() {
        let frame = PixelFrame {
            width: 4,
            height: 2,
            format: PixelFormat::Bgra,
            pts: MediaTime::new(0, 600),
            data: vec![0; 31],
        };
        assert!(!frame.has_data());

        let frame = PixelFrame {
            data: vec![0; 32],
            ..frame
        };
        assert!(frame.has_data());
    }

    #[test]
    fn test_oversized_frame_dimensions() {
        assert_eq!(PixelFormat::Bgra.frame_size(u32::MAX, u32::MAX), None);
        assert_eq!(PixelFormat::Nv12.frame_size(4, 2), Some(12));

        let frame = PixelFrame {
            width: u32::MAX,
            height: u32::MAX,
            format: PixelFormat::Bgra,
            pts: MediaTime::new(0, 600),
            data: vec![0; 16],
        };
        assert!(!frame.has_data());
    }
}
