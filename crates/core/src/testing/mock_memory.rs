//! Scripted memory sampler for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::batch::MemorySampler;

/// Memory sampler that replays a fixed sequence of readings.
///
/// Readings are returned in order; the last one repeats forever. An empty
/// script behaves like a platform without memory statistics.
#[derive(Debug, Default)]
pub struct ScriptedMemorySampler {
    readings: Mutex<VecDeque<f64>>,
    samples: AtomicUsize,
    reclaims: AtomicUsize,
}

impl ScriptedMemorySampler {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn constant(memory_mb: f64) -> Self {
        Self::new([memory_mb])
    }

    /// Always returns `None`.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Replaces the remaining script.
    pub fn set(&self, readings: impl IntoIterator<Item = f64>) {
        *self.readings.lock().unwrap() = readings.into_iter().collect();
    }

    pub fn sample_count(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn reclaim_requests(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }
}

impl MemorySampler for ScriptedMemorySampler {
    fn sample_mb(&self) -> Option<f64> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let mut readings = self.readings.lock().unwrap();
        if readings.len() > 1 {
            readings.pop_front()
        } else {
            readings.front().copied()
        }
    }

    fn request_reclaim(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_reading_repeats() {
        let sampler = ScriptedMemorySampler::new([10.0, 20.0]);
        assert_eq!(sampler.sample_mb(), Some(10.0));
        assert_eq!(sampler.sample_mb(), Some(20.0));
        assert_eq!(sampler.sample_mb(), Some(20.0));
        assert_eq!(sampler.sample_count(), 3);
    }

    #[test]
    fn test_unavailable() {
        assert_eq!(ScriptedMemorySampler::unavailable().sample_mb(), None);
    }
}
