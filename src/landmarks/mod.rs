//! Hand landmark contract
//!
//! A landmark provider turns one RGB image into zero or more hands, each
//! described by 21 normalized keypoints in the MediaPipe anatomical order.
//! The model behind the provider is external; this module only fixes the
//! shape of its output and how the pipeline degrades when it is missing.

#[cfg(feature = "onnx")]
mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OnnxHandLandmarker;

use std::ops::Index;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::LandmarkError;

/// Number of keypoints per detected hand
pub const LANDMARK_COUNT: usize = 21;

/// Normalized 2D keypoint (0.0 - 1.0 in image space, y grows downwards)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in normalized coordinates
    pub fn distance(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Point halfway between two landmarks
    pub fn midpoint(&self, other: &Landmark) -> Landmark {
        Landmark::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }
}

/// Anatomical keypoint names, in provider output order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum HandJoint {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexMcp = 5,
    IndexPip = 6,
    IndexDip = 7,
    IndexTip = 8,
    MiddleMcp = 9,
    MiddlePip = 10,
    MiddleDip = 11,
    MiddleTip = 12,
    RingMcp = 13,
    RingPip = 14,
    RingDip = 15,
    RingTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

/// Exactly 21 landmarks of one detected hand
#[derive(Clone, Debug, PartialEq)]
pub struct HandLandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

impl HandLandmarkSet {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from a provider slice; any count other than 21 is rejected
    pub fn from_slice(points: &[Landmark]) -> Option<Self> {
        let points: [Landmark; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self { points })
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }

    pub fn get(&self, joint: HandJoint) -> Landmark {
        self.points[joint as usize]
    }

    /// Replace a single keypoint
    pub fn set(&mut self, joint: HandJoint, landmark: Landmark) {
        self.points[joint as usize] = landmark;
    }
}

impl Index<HandJoint> for HandLandmarkSet {
    type Output = Landmark;

    fn index(&self, joint: HandJoint) -> &Landmark {
        &self.points[joint as usize]
    }
}

/// Source of per-frame hand landmarks
pub trait LandmarkProvider: Send {
    /// Short name for logging
    fn name(&self) -> &str;

    /// Detect hands in one RGB image. An empty vector means no hand.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarkSet>, LandmarkError>;
}

/// Create the landmark provider compiled into this build.
///
/// An error here is not fatal: the pipeline keeps streaming frames in
/// camera-only mode and never emits gestures or cursor updates.
pub fn create_default_provider(max_hands: usize) -> Result<Box<dyn LandmarkProvider>, LandmarkError> {
    #[cfg(feature = "onnx")]
    {
        let provider = OnnxHandLandmarker::new(max_hands)?;
        Ok(Box::new(provider))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = max_hands;
        Err(LandmarkError::Unavailable(
            "built without the `onnx` feature".to_string(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_from_slice_requires_21_points() {
        let points = vec![Landmark::default(); 20];
        assert!(HandLandmarkSet::from_slice(&points).is_none());

        let points = vec![Landmark::new(0.5, 0.5); 21];
        let set = HandLandmarkSet::from_slice(&points).unwrap();
        assert_eq!(set[HandJoint::PinkyTip], Landmark::new(0.5, 0.5));

        let points = vec![Landmark::default(); 22];
        assert!(HandLandmarkSet::from_slice(&points).is_none());
    }

    #[test]
    fn test_joint_order_matches_model_output() {
        assert_eq!(HandJoint::Wrist as usize, 0);
        assert_eq!(HandJoint::ThumbIp as usize, 3);
        assert_eq!(HandJoint::ThumbTip as usize, 4);
        assert_eq!(HandJoint::IndexPip as usize, 6);
        assert_eq!(HandJoint::IndexTip as usize, 8);
        assert_eq!(HandJoint::MiddleMcp as usize, 9);
        assert_eq!(HandJoint::MiddleTip as usize, 12);
        assert_eq!(HandJoint::RingTip as usize, 16);
        assert_eq!(HandJoint::PinkyTip as usize, 20);
    }

    #[test]
    fn test_synthetic_hand_geometry() {
        let open = hand(0.5, 0.5, 1.0, OPEN);
        let size = open[HandJoint::Wrist].distance(&open[HandJoint::MiddleTip]);
        assert!((size - 0.35).abs() < 1e-5);

        let center = open[HandJoint::Wrist].midpoint(&open[HandJoint::MiddleMcp]);
        assert!((center.x - 0.5).abs() < 1e-6);
        assert!((center.y - 0.5).abs() < 1e-6);

        let pinched = with_pinch(open, 0.03);
        let dist = pinched[HandJoint::ThumbTip].distance(&pinched[HandJoint::IndexTip]);
        assert!((dist - 0.03).abs() < 1e-5);
    }

    #[test]
    fn test_default_provider_without_onnx_is_unavailable() {
        #[cfg(not(feature = "onnx"))]
        assert!(matches!(
            create_default_provider(1),
            Err(LandmarkError::Unavailable(_))
        ));
    }
}
