//! Static hand poses from finger extension

use crate::landmarks::{HandJoint, HandLandmarkSet};

/// Which digits are extended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerState {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    /// Evaluate a hand in the mirrored (selfie) view.
    ///
    /// The thumb is extended when its tip lies left of its IP joint; the other
    /// fingers when the tip lies above the PIP joint.
    pub fn from_hand(hand: &HandLandmarkSet) -> Self {
        let above = |tip: HandJoint, pip: HandJoint| hand[tip].y < hand[pip].y;
        Self {
            thumb: hand[HandJoint::ThumbTip].x < hand[HandJoint::ThumbIp].x,
            index: above(HandJoint::IndexTip, HandJoint::IndexPip),
            middle: above(HandJoint::MiddleTip, HandJoint::MiddlePip),
            ring: above(HandJoint::RingTip, HandJoint::RingPip),
            pinky: above(HandJoint::PinkyTip, HandJoint::PinkyPip),
        }
    }

    pub fn count(&self) -> usize {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
            .iter()
            .filter(|&&extended| extended)
            .count()
    }

    pub fn pose(&self) -> HandPose {
        match self.count() {
            0 => HandPose::Fist,
            5 => HandPose::OpenPalm,
            _ => HandPose::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandPose {
    Fist,
    OpenPalm,
    #[default]
    Other,
}
