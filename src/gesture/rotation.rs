//! Circular hand motion accumulated into rotate gestures

use std::time::{Duration, Instant};

use super::history::GestureHistory;
use super::GestureEvent;

/// Wrap an angle in degrees into (-180, 180]
pub fn normalize_degrees(angle: f32) -> f32 {
    let mut wrapped = angle % 360.0;
    if wrapped > 180.0 {
        wrapped -= 360.0;
    } else if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    wrapped
}

/// Turning angle contributed by the newest sample.
///
/// Compares the heading of the newest step with the heading of the previous
/// step that moved at least `min_movement`. Steps shorter than that are
/// noise and contribute nothing. Positive is clockwise on screen (y down).
pub fn frame_rotation(history: &GestureHistory, min_movement: f32) -> f32 {
    let n = history.len();
    if n < 3 {
        return 0.0;
    }

    let (Some(newest), Some(previous)) = (history.get(n - 1), history.get(n - 2)) else {
        return 0.0;
    };

    let (dx2, dy2) = (newest.x - previous.x, newest.y - previous.y);
    if dx2.hypot(dy2) < min_movement {
        return 0.0;
    }

    for k in (0..n - 2).rev() {
        let Some(anchor) = history.get(k) else {
            break;
        };
        let (dx1, dy1) = (previous.x - anchor.x, previous.y - anchor.y);
        if dx1.hypot(dy1) >= min_movement {
            let heading1 = dy1.atan2(dx1).to_degrees();
            let heading2 = dy2.atan2(dx2).to_degrees();
            return normalize_degrees(heading2 - heading1);
        }
    }

    0.0
}

/// Signed rotation accumulator with threshold and cooldown
#[derive(Debug, Clone)]
pub struct RotationTracker {
    threshold: f32,
    cooldown: Duration,
    min_movement: f32,
    accumulated: f32,
    last_emit: Option<Instant>,
}

impl RotationTracker {
    pub fn new(threshold_degrees: f32, cooldown: Duration, min_movement: f32) -> Self {
        Self {
            threshold: threshold_degrees.abs().max(1.0),
            cooldown,
            min_movement: min_movement.max(0.0),
            accumulated: 0.0,
            last_emit: None,
        }
    }

    /// Add this frame's rotation and emit when the threshold is exceeded.
    ///
    /// On emission only the part beyond the threshold is carried forward.
    pub fn update(&mut self, history: &GestureHistory, now: Instant) -> Option<GestureEvent> {
        self.accumulated += frame_rotation(history, self.min_movement);

        if self.accumulated.abs() <= self.threshold || !self.cooldown_elapsed(now) {
            return None;
        }

        let event = if self.accumulated > 0.0 {
            GestureEvent::RotateCw
        } else {
            GestureEvent::RotateCcw
        };
        self.accumulated %= self.threshold;
        self.last_emit = Some(now);
        Some(event)
    }

    pub fn reset(&mut self) {
        self.accumulated = 0.0;
    }

    pub fn accumulated(&self) -> f32 {
        self.accumulated
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_emit
            .map(|last| now.saturating_duration_since(last) >= self.cooldown)
            .unwrap_or(true)
    }
}
