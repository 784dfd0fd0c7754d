//! Gesture classification
//!
//! Turns one hand's landmarks per frame into discrete gesture events and a
//! cursor position. The classifier is stateful: it keeps a short history of
//! hand centres for rotation, a pinch latch for click hysteresis and the last
//! static pose so fist / open palm fire once per entry.

mod history;
mod pinch;
mod pose;
mod rotation;

pub use history::{GestureHistory, HandSample};
pub use pinch::PinchDetector;
pub use pose::{FingerState, HandPose};
pub use rotation::{frame_rotation, normalize_degrees, RotationTracker};

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::CommandParseError;
use crate::landmarks::{HandJoint, HandLandmarkSet};

/// Discrete gestures recognised by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureEvent {
    Fist,
    PinchClick,
    RotateCw,
    RotateCcw,
    OpenPalm,
}

impl GestureEvent {
    pub const ALL: [GestureEvent; 5] = [
        GestureEvent::Fist,
        GestureEvent::PinchClick,
        GestureEvent::RotateCw,
        GestureEvent::RotateCcw,
        GestureEvent::OpenPalm,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureEvent::Fist => "FIST",
            GestureEvent::PinchClick => "PINCH_CLICK",
            GestureEvent::RotateCw => "ROTATE_CW",
            GestureEvent::RotateCcw => "ROTATE_CCW",
            GestureEvent::OpenPalm => "OPEN_PALM",
        }
    }
}

impl fmt::Display for GestureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureEvent {
    type Err = CommandParseError;

    /// Accepts wire names case-insensitively, with `-` or `_`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == normalized)
            .ok_or_else(|| CommandParseError::UnknownGesture(s.trim().to_string()))
    }
}

/// Normalized cursor position (index fingertip)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f32,
    pub y: f32,
}

/// Result of classifying one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierOutput {
    pub events: Vec<GestureEvent>,
    /// Set only when the cursor moved this frame
    pub cursor: Option<CursorPosition>,
}

impl ClassifierOutput {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.cursor.is_none()
    }
}

/// Classifier thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Wrist to middle fingertip distance below which a hand is ignored
    #[serde(rename = "minHandSize")]
    pub min_hand_size: f32,
    /// Thumb/index distance that arms a pinch
    #[serde(rename = "pinchThreshold")]
    pub pinch_threshold: f32,
    /// Release distance as a multiple of the pinch threshold
    #[serde(rename = "pinchReleaseRatio")]
    pub pinch_release_ratio: f32,
    #[serde(rename = "clickCooldownMs")]
    pub click_cooldown_ms: u64,
    /// Accumulated degrees needed for one rotate event
    #[serde(rename = "rotationThreshold")]
    pub rotation_threshold: f32,
    #[serde(rename = "rotationCooldownMs")]
    pub rotation_cooldown_ms: u64,
    /// Centre movement below this is treated as jitter
    #[serde(rename = "minMovement")]
    pub min_movement: f32,
    #[serde(rename = "historyCapacity")]
    pub history_capacity: usize,
    #[serde(rename = "emitOpenPalm")]
    pub emit_open_palm: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            min_hand_size: 0.15,
            pinch_threshold: 0.05,
            pinch_release_ratio: 1.5,
            click_cooldown_ms: 500,
            rotation_threshold: 540.0,
            rotation_cooldown_ms: 500,
            min_movement: 0.005,
            history_capacity: 10,
            emit_open_palm: false,
        }
    }
}

impl GestureConfig {
    pub fn sanitize(&mut self) {
        self.min_hand_size = self.min_hand_size.clamp(0.0, 1.0);
        self.pinch_threshold = self.pinch_threshold.clamp(0.001, 1.0);
        self.pinch_release_ratio = self.pinch_release_ratio.clamp(1.0, 10.0);
        self.rotation_threshold = self.rotation_threshold.clamp(1.0, 36_000.0);
        self.min_movement = self.min_movement.clamp(0.0, 1.0);
        self.history_capacity = self.history_capacity.clamp(3, 256);
    }
}

/// Per-frame gesture classifier for a single hand
pub struct GestureClassifier {
    config: GestureConfig,
    history: GestureHistory,
    pinch: PinchDetector,
    rotation: RotationTracker,
    cursor: Option<CursorPosition>,
    /// Last static pose seen on an accepted hand
    pose: HandPose,
}

impl GestureClassifier {
    pub fn new(mut config: GestureConfig) -> Self {
        config.sanitize();
        Self {
            history: GestureHistory::new(config.history_capacity),
            pinch: PinchDetector::new(
                config.pinch_threshold,
                config.pinch_release_ratio,
                Duration::from_millis(config.click_cooldown_ms),
            ),
            rotation: RotationTracker::new(
                config.rotation_threshold,
                Duration::from_millis(config.rotation_cooldown_ms),
                config.min_movement,
            ),
            cursor: None,
            pose: HandPose::Other,
            config,
        }
    }

    /// Classify one frame. `None` means no hand was detected.
    pub fn classify(&mut self, hand: Option<&HandLandmarkSet>, now: Instant) -> ClassifierOutput {
        let mut output = ClassifierOutput::default();

        let Some(hand) = hand else {
            self.hand_lost();
            return output;
        };

        let hand_size = hand[HandJoint::Wrist].distance(&hand[HandJoint::MiddleTip]);
        if hand_size < self.config.min_hand_size {
            tracing::trace!(hand_size, "Hand too far away, ignored");
            return output;
        }

        let tip = hand[HandJoint::IndexTip];
        let cursor = CursorPosition {
            x: tip.x.clamp(0.0, 1.0),
            y: tip.y.clamp(0.0, 1.0),
        };
        if self.cursor != Some(cursor) {
            self.cursor = Some(cursor);
            output.cursor = Some(cursor);
        }

        let pose = FingerState::from_hand(hand).pose();
        if pose != self.pose {
            self.pose = pose;
            match pose {
                HandPose::Fist => output.events.push(GestureEvent::Fist),
                HandPose::OpenPalm if self.config.emit_open_palm => {
                    output.events.push(GestureEvent::OpenPalm)
                }
                _ => {}
            }
        }

        let pinch_distance = hand[HandJoint::ThumbTip].distance(&hand[HandJoint::IndexTip]);
        if self.pinch.update(pinch_distance, now) {
            output.events.push(GestureEvent::PinchClick);
        }

        let center = hand[HandJoint::Wrist].midpoint(&hand[HandJoint::MiddleMcp]);
        self.history.push(HandSample {
            x: center.x,
            y: center.y,
            timestamp: now,
        });
        if let Some(event) = self.rotation.update(&self.history, now) {
            output.events.push(event);
        }

        for event in &output.events {
            tracing::debug!(gesture = %event, "Gesture detected");
        }

        output
    }

    fn hand_lost(&mut self) {
        self.history.clear();
        self.rotation.reset();
        self.pose = HandPose::Other;
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn history(&self) -> &GestureHistory {
        &self.history
    }

    pub fn rotation_accumulator(&self) -> f32 {
        self.rotation.accumulated()
    }

    pub fn pinch_armed(&self) -> bool {
        self.pinch.is_armed()
    }

    /// Last reported cursor position
    pub fn cursor(&self) -> Option<CursorPosition> {
        self.cursor
    }
}
