//! Frame-difference liveness heuristic.
//!
//! A photo held up to the camera produces near-zero difference between
//! consecutive frames. The detector keeps the last few frames, scores the mean
//! adjacent-pair difference, and tracks two signals: how many consecutive
//! checks stayed below the static threshold, and how long it has been since
//! the last check above it. Either signal tripping blocks authentication.

use crate::camera::Frame;
use crate::common::config::LivenessConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    Live,
    /// Long run of near-identical frames, likely a photo.
    Static,
    /// No motion above the threshold for longer than the inactivity timeout.
    Inactive,
}

#[derive(Debug, Clone)]
pub struct LivenessSettings {
    pub window_capacity: usize,
    pub sample_stride: usize,
    pub static_threshold: f32,
    pub static_run_limit: u32,
    pub inactivity_timeout: Duration,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self::from(&LivenessConfig::default())
    }
}

impl From<&LivenessConfig> for LivenessSettings {
    fn from(config: &LivenessConfig) -> Self {
        Self {
            window_capacity: config.window_capacity,
            sample_stride: config.sample_stride,
            static_threshold: config.static_threshold,
            static_run_limit: config.static_run_limit,
            inactivity_timeout: Duration::from_millis(config.inactivity_timeout_ms),
        }
    }
}

/// Fixed-capacity ring of the most recent frames, oldest evicted first.
#[derive(Debug)]
pub struct FrameWindow {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn latest(&self) -> Option<&Frame> {
        self.frames.back()
    }

    /// Mean difference over adjacent pairs, `None` with fewer than two frames.
    pub fn motion_score(&self, stride: usize) -> Option<f32> {
        if self.frames.len() < 2 {
            return None;
        }
        let total: f32 = self
            .frames
            .iter()
            .zip(self.frames.iter().skip(1))
            .map(|(older, newer)| frame_difference(older, newer, stride))
            .sum();
        Some(total / (self.frames.len() - 1) as f32)
    }
}

#[derive(Debug, Clone)]
pub struct MovementState {
    static_frame_count: u32,
    last_movement: Instant,
}

impl MovementState {
    fn new(now: Instant) -> Self {
        Self {
            static_frame_count: 0,
            last_movement: now,
        }
    }

    pub fn static_frame_count(&self) -> u32 {
        self.static_frame_count
    }

    pub fn last_movement(&self) -> Instant {
        self.last_movement
    }
}

/// Mean absolute RGB difference over every `stride`-th byte offset.
///
/// Frames of different dimensions score as maximal motion: the stream was
/// reconfigured, which is never a held-up photo.
pub fn frame_difference(a: &Frame, b: &Frame, stride: usize) -> f32 {
    if !a.same_dimensions(b) {
        return f32::INFINITY;
    }

    let (da, db) = (a.data(), b.data());
    let mut diff = 0u64;
    let mut samples = 0u64;
    for i in (0..da.len().saturating_sub(2)).step_by(stride.max(1)) {
        diff += da[i].abs_diff(db[i]) as u64;
        diff += da[i + 1].abs_diff(db[i + 1]) as u64;
        diff += da[i + 2].abs_diff(db[i + 2]) as u64;
        samples += 1;
    }

    if samples == 0 {
        0.0
    } else {
        diff as f32 / samples as f32
    }
}

pub struct LivenessDetector {
    settings: LivenessSettings,
    window: FrameWindow,
    movement: MovementState,
}

impl LivenessDetector {
    pub fn new(settings: LivenessSettings, now: Instant) -> Self {
        Self {
            window: FrameWindow::new(settings.window_capacity),
            movement: MovementState::new(now),
            settings,
        }
    }

    /// Push a frame and classify the feed.
    pub fn evaluate(&mut self, frame: Frame, now: Instant) -> LivenessVerdict {
        self.window.push(frame);

        // Not enough history to judge: permissive, counters untouched.
        let Some(score) = self.window.motion_score(self.settings.sample_stride) else {
            return LivenessVerdict::Live;
        };

        if score < self.settings.static_threshold {
            self.movement.static_frame_count = self.movement.static_frame_count.saturating_add(1);
        } else {
            self.movement.static_frame_count = 0;
            self.movement.last_movement = now;
        }

        let verdict = if self.movement.static_frame_count > self.settings.static_run_limit {
            LivenessVerdict::Static
        } else if now.saturating_duration_since(self.movement.last_movement) > self.settings.inactivity_timeout {
            LivenessVerdict::Inactive
        } else {
            LivenessVerdict::Live
        };

        tracing::debug!(
            "liveness: score={:.2} static_run={} verdict={:?}",
            score, self.movement.static_frame_count, verdict
        );
        verdict
    }

    /// Drop all history; a new capture session starts at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.window.clear();
        self.movement = MovementState::new(now);
    }

    pub fn window(&self) -> &FrameWindow {
        &self.window
    }

    pub fn movement(&self) -> &MovementState {
        &self.movement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::BYTES_PER_PIXEL;

    const W: u32 = 8;
    const H: u32 = 8;

    fn solid(value: u8) -> Frame {
        Frame::from_rgba(W, H, vec![value; (W * H) as usize * BYTES_PER_PIXEL]).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let mut window = FrameWindow::new(5);
        for v in 0..7u8 {
            window.push(solid(v));
        }
        assert_eq!(window.len(), 5);
        assert_eq!(window.latest().unwrap().data()[0], 6);
    }

    #[test]
    fn difference_samples_rgb_every_stride() {
        let a = solid(10);
        let b = solid(13);
        // 3 per channel, 3 channels per sample.
        assert_eq!(frame_difference(&a, &b, 16), 9.0);
        assert_eq!(frame_difference(&a, &a, 16), 0.0);
    }

    #[test]
    fn mismatched_dimensions_count_as_motion() {
        let small = Frame::from_rgba(2, 2, vec![0; 16]).unwrap();
        assert!(frame_difference(&small, &solid(0), 16).is_infinite());
    }

    #[test]
    fn insufficient_history_is_permissive() {
        let t0 = Instant::now();
        let mut detector = LivenessDetector::new(LivenessSettings::default(), t0);
        // Even long after the inactivity timeout, one frame is not enough to judge.
        assert_eq!(detector.evaluate(solid(0), t0 + ms(10_000)), LivenessVerdict::Live);
        assert_eq!(detector.movement().static_frame_count(), 0);
    }

    #[test]
    fn repeated_frame_turns_static_on_sixteenth_check() {
        let t0 = Instant::now();
        let mut detector = LivenessDetector::new(LivenessSettings::default(), t0);

        // First evaluation only fills the window; checks start at the second.
        let mut now = t0;
        assert_eq!(detector.evaluate(solid(50), now), LivenessVerdict::Live);
        for check in 1..=15 {
            now += ms(10);
            assert_eq!(detector.evaluate(solid(50), now), LivenessVerdict::Live, "check {check}");
        }
        now += ms(10);
        assert_eq!(detector.evaluate(solid(50), now), LivenessVerdict::Static);
        assert_eq!(detector.movement().static_frame_count(), 16);
    }

    #[test]
    fn motion_resets_static_run() {
        let t0 = Instant::now();
        let mut detector = LivenessDetector::new(LivenessSettings::default(), t0);
        let mut now = t0;
        for _ in 0..12 {
            now += ms(10);
            detector.evaluate(solid(50), now);
        }
        assert_eq!(detector.movement().static_frame_count(), 11);

        now += ms(10);
        assert_eq!(detector.evaluate(solid(250), now), LivenessVerdict::Live);
        assert_eq!(detector.movement().static_frame_count(), 0);
        assert_eq!(detector.movement().last_movement(), now);
    }

    #[test]
    fn inactivity_trips_without_a_static_run() {
        let t0 = Instant::now();
        let mut detector = LivenessDetector::new(LivenessSettings::default(), t0);

        // Slow evaluation rate: never 16 low-motion checks, but >3s since motion.
        let mut now = t0;
        let mut verdict = LivenessVerdict::Live;
        for _ in 0..9 {
            now += ms(400);
            verdict = detector.evaluate(solid(80), now);
        }
        assert!(detector.movement().static_frame_count() <= 15);
        assert_eq!(verdict, LivenessVerdict::Inactive);
    }

    #[test]
    fn reset_clears_window_and_counters() {
        let t0 = Instant::now();
        let mut detector = LivenessDetector::new(LivenessSettings::default(), t0);
        for i in 0..4 {
            detector.evaluate(solid(1), t0 + ms(i));
        }
        let later = t0 + ms(500);
        detector.reset(later);
        assert!(detector.window().is_empty());
        assert_eq!(detector.movement().static_frame_count(), 0);
        assert_eq!(detector.movement().last_movement(), later);
    }
}
