use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Bounded, thread-safe sliding window of attention samples.
///
/// Holds at most `capacity` samples in insertion order; appending to a
/// full buffer evicts the oldest. Every operation takes the lock once,
/// so readers see the window either before or after an append, never
/// in between. Sample values are stored as given: callers are expected
/// to pass 0.0 (focused) or 1.0 (distracted) but nothing is validated.
#[derive(Debug)]
pub struct SampleBuffer {
    window: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl SampleBuffer {
    /// Creates an empty buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "sample buffer capacity must be positive".to_string(),
            ));
        }

        Ok(Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        })
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn append(&self, sample: f64) {
        let mut window = self.window.lock();
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(sample);
    }

    /// Mean of the samples currently held, or `0.0` when empty.
    pub fn average(&self) -> f64 {
        let window = self.window.lock();
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f64>() / window.len() as f64
    }

    /// Copy of the held samples, oldest first.
    pub fn snapshot(&self) -> Vec<f64> {
        self.window.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.window.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.window.lock().clear();
    }
}
