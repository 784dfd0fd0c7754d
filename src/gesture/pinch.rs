//! Pinch click detection with hysteresis

use std::time::{Duration, Instant};

/// Thumb/index pinch detector.
///
/// Arms below the enter threshold and only disarms above
/// `enter * release_ratio`, so jitter around the boundary cannot re-trigger.
#[derive(Debug, Clone)]
pub struct PinchDetector {
    enter_threshold: f32,
    release_ratio: f32,
    cooldown: Duration,
    armed: bool,
    last_click: Option<Instant>,
}

impl PinchDetector {
    pub fn new(enter_threshold: f32, release_ratio: f32, cooldown: Duration) -> Self {
        Self {
            enter_threshold,
            release_ratio: release_ratio.max(1.0),
            cooldown,
            armed: false,
            last_click: None,
        }
    }

    /// Feed one frame's thumb-to-index distance; true when a click fires
    pub fn update(&mut self, distance: f32, now: Instant) -> bool {
        if self.armed {
            if distance > self.release_threshold() {
                self.armed = false;
            }
            return false;
        }

        if distance < self.enter_threshold && self.cooldown_elapsed(now) {
            self.armed = true;
            self.last_click = Some(now);
            return true;
        }

        false
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn release_threshold(&self) -> f32 {
        self.enter_threshold * self.release_ratio
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_click
            .map(|last| now.saturating_duration_since(last) >= self.cooldown)
            .unwrap_or(true)
    }
}
