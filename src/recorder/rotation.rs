//! Rotation boundary tracking
//!
//! Decides, from incoming timestamps, when the current segment ends. Video is
//! the timing reference: audio never seeds or crosses the boundary.

use crate::capture::traits::{MediaKind, MediaTime};
use std::time::Duration;

/// What a boundary crossing asks the recorder to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cut {
    /// First crossing since the last clear: open the first segment
    Open,
    /// Close the current segment and open the next one
    Rotate,
}

#[derive(Debug)]
pub struct RotationController {
    segment_duration: Duration,
    boundary: Option<MediaTime>,
    opened: bool,
}

impl RotationController {
    pub fn new(segment_duration: Duration) -> Self {
        Self {
            segment_duration,
            boundary: None,
            opened: false,
        }
    }

    pub fn set_segment_duration(&mut self, segment_duration: Duration) {
        self.segment_duration = segment_duration;
    }

    /// Next scheduled cut, if one has been seeded
    pub fn boundary(&self) -> Option<MediaTime> {
        self.boundary
    }

    /// Feed one timestamp and report whether it crosses the boundary.
    ///
    /// The first video timestamp seeds the boundary and opens the first
    /// window. Every crossing moves the boundary forward by exactly one
    /// segment duration, in a tick rate that also counts the crossing
    /// sample's timescale.
    pub fn observe(&mut self, pts: MediaTime, kind: MediaKind) -> Option<Cut> {
        if kind != MediaKind::Video || !pts.is_valid() {
            return None;
        }

        let boundary = *self.boundary.get_or_insert(pts);
        if pts < boundary {
            return None;
        }

        self.boundary = Some(boundary.advance_by(self.segment_duration, pts.timescale));

        if self.opened {
            Some(Cut::Rotate)
        } else {
            self.opened = true;
            Some(Cut::Open)
        }
    }

    /// Forget the boundary so the next session seeds its own
    pub fn clear(&mut self) {
        self.boundary = None;
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: i64) -> MediaTime {
        MediaTime::new(value * 600, 600)
    }

    fn controller(secs: u64) -> RotationController {
        RotationController::new(Duration::from_secs(secs))
    }

    #[test]
    fn test_scenario_two_second_segments() {
        let mut rotation = controller(2);
        let cuts: Vec<_> = (0..=4)
            .map(|t| rotation.observe(secs(t), MediaKind::Video))
            .collect();

        assert_eq!(
            cuts,
            vec![Some(Cut::Open), None, Some(Cut::Rotate), None, Some(Cut::Rotate)]
        );
        assert_eq!(rotation.boundary(), Some(secs(6)));
    }

    #[test]
    fn test_no_rotation_within_one_duration() {
        let mut rotation = controller(2);
        let rotations = (0..20)
            .map(|i| MediaTime::new(i * 59, 600))
            .filter_map(|t| rotation.observe(t, MediaKind::Video))
            .filter(|cut| *cut == Cut::Rotate)
            .count();
        assert_eq!(rotations, 0);
    }

    #[test]
    fn test_n_crossings_give_n_rotations() {
        let mut rotation = controller(1);
        // 30fps for 10 seconds starting at an arbitrary offset
        let rotations = (0..300)
            .map(|frame| MediaTime::new(123_456 + frame * 20, 600))
            .filter_map(|t| rotation.observe(t, MediaKind::Video))
            .filter(|cut| *cut == Cut::Rotate)
            .count();
        assert_eq!(rotations, 9);
    }

    #[test]
    fn test_audio_neither_seeds_nor_rotates() {
        let mut rotation = controller(2);
        assert_eq!(rotation.observe(MediaTime::new(0, 48_000), MediaKind::Audio), None);
        assert_eq!(rotation.boundary(), None);

        rotation.observe(secs(0), MediaKind::Video);
        assert_eq!(rotation.observe(MediaTime::new(480_000, 48_000), MediaKind::Audio), None);
        assert_eq!(rotation.boundary(), Some(secs(2)));
    }

    #[test]
    fn test_late_sample_does_not_move_boundary() {
        let mut rotation = controller(2);
        rotation.observe(secs(10), MediaKind::Video);
        assert_eq!(rotation.observe(secs(3), MediaKind::Video), None);
        assert_eq!(rotation.boundary(), Some(secs(12)));
    }

    #[test]
    fn test_boundary_follows_triggering_timescale() {
        let mut rotation = controller(2);
        rotation.observe(MediaTime::new(0, 600), MediaKind::Video);
        let cut = rotation.observe(MediaTime::new(180_000, 90_000), MediaKind::Video);
        assert_eq!(cut, Some(Cut::Rotate));

        let boundary = rotation.boundary().unwrap();
        assert_eq!(boundary.timescale, 90_000);
        assert_eq!(boundary.value, 360_000);
    }

    #[test]
    fn test_switching_timescales_advances_one_full_duration() {
        let mut rotation = controller(1);
        rotation.observe(MediaTime::new(1, 3), MediaKind::Video);
        assert_eq!(rotation.boundary(), Some(MediaTime::new(4, 3)));

        assert_eq!(rotation.observe(MediaTime::new(2, 1), MediaKind::Video), Some(Cut::Rotate));
        assert_eq!(rotation.boundary(), Some(MediaTime::new(7, 3)));
        assert_eq!(rotation.observe(MediaTime::new(2, 1), MediaKind::Video), None);
    }

    #[test]
    fn test_short_segments_on_coarse_timescale() {
        let mut rotation = RotationController::new(Duration::from_millis(500));
        let cuts: Vec<_> = (0..3)
            .map(|_| rotation.observe(MediaTime::new(0, 1), MediaKind::Video))
            .collect();
        assert_eq!(cuts, vec![Some(Cut::Open), None, None]);
        assert_eq!(rotation.boundary(), Some(MediaTime::new(1, 2)));

        assert_eq!(rotation.observe(MediaTime::new(1, 1), MediaKind::Video), Some(Cut::Rotate));
        assert_eq!(rotation.boundary(), Some(MediaTime::new(1, 1)));
    }

    #[test]
    fn test_clear_reseeds_from_next_timestamp() {
        let mut rotation = controller(2);
        rotation.observe(secs(100), MediaKind::Video);
        rotation.clear();
        assert_eq!(rotation.boundary(), None);

        assert_eq!(rotation.observe(secs(0), MediaKind::Video), Some(Cut::Open));
        assert_eq!(rotation.boundary(), Some(secs(2)));
    }
}
