//! Synthetic frames used when no real camera frame is available

use std::f32::consts::PI;
use std::f64::consts::TAU;

use image::{Rgb, RgbImage};

/// Animated two-channel gradient, a pure function of the frame counter
pub struct TestPattern {
    width: u32,
    height: u32,
    frame_counter: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_counter: 0,
        }
    }

    /// Render the next frame and advance the counter
    pub fn next_image(&mut self) -> RgbImage {
        let image = Self::render(self.frame_counter, self.width, self.height);
        self.frame_counter = self.frame_counter.wrapping_add(1);
        image
    }

    /// Frames rendered so far
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Green sweeps horizontally with a sine, blue vertically with a cosine
    pub fn render(frame: u64, width: u32, height: u32) -> RgbImage {
        // Reduced in f64 so large counters keep precision and the animation never jumps
        let phase = (frame as f64 * 0.1).rem_euclid(TAU) as f32;
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;

        RgbImage::from_fn(width, height, |x, y| {
            let g = ((phase + x as f32 / w * PI).sin() + 1.0) * 127.5;
            let b = ((phase + y as f32 / h * PI).cos() + 1.0) * 127.5;
            Rgb([0, g as u8, b as u8])
        })
    }
}
