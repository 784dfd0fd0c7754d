//! Bounded history of hand centre positions

use std::time::Instant;

/// Hand centre at one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandSample {
    pub x: f32,
    pub y: f32,
    pub timestamp: Instant,
}

/// Fixed-capacity ring buffer; pushing into a full buffer overwrites the oldest sample
#[derive(Debug, Clone)]
pub struct GestureHistory {
    samples: Vec<HandSample>,
    /// Index of the oldest sample once the buffer has wrapped
    head: usize,
    capacity: usize,
}

impl GestureHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn push(&mut self, sample: HandSample) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.head = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sample by age order, 0 = oldest
    pub fn get(&self, index: usize) -> Option<&HandSample> {
        if index >= self.samples.len() {
            return None;
        }
        self.samples.get((self.head + index) % self.samples.len())
    }

    pub fn newest(&self) -> Option<&HandSample> {
        self.samples.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &HandSample> + '_ {
        (0..self.samples.len()).filter_map(move |i| self.get(i))
    }
}
