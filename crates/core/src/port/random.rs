// Random Source Port (topic/category picks, schedule jitter)

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Randomness interface (allows deterministic picks in tests)
pub trait RandomSource: Send + Sync {
    /// Uniform index in `0..len` (`len` > 0)
    fn pick(&self, len: usize) -> usize;

    /// Uniform delay in `0..=max_millis`
    fn jitter_ms(&self, max_millis: i64) -> i64;
}

/// Thread-local RNG (production)
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }

    fn jitter_ms(&self, max_millis: i64) -> i64 {
        if max_millis <= 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=max_millis)
    }
}

/// Deterministic source: fixed jitter, picks cycle through `0, 1, 2, ...`
pub struct FixedRandom {
    jitter_ms: i64,
    next_pick: AtomicUsize,
    jitter_draws: AtomicUsize,
}

impl FixedRandom {
    pub fn new(jitter_ms: i64) -> Self {
        Self {
            jitter_ms,
            next_pick: AtomicUsize::new(0),
            jitter_draws: AtomicUsize::new(0),
        }
    }

    /// How many times a jitter delay was requested
    pub fn jitter_draws(&self) -> usize {
        self.jitter_draws.load(Ordering::SeqCst)
    }
}

impl Default for FixedRandom {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RandomSource for FixedRandom {
    fn pick(&self, len: usize) -> usize {
        self.next_pick.fetch_add(1, Ordering::SeqCst) % len
    }

    fn jitter_ms(&self, max_millis: i64) -> i64 {
        self.jitter_draws.fetch_add(1, Ordering::SeqCst);
        self.jitter_ms.clamp(0, max_millis.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_stays_in_range() {
        let rng = ThreadRandom;
        for _ in 0..100 {
            assert!(rng.pick(3) < 3);
            let j = rng.jitter_ms(1_000);
            assert!((0..=1_000).contains(&j));
        }
        assert_eq!(rng.jitter_ms(0), 0);
    }

    #[test]
    fn test_fixed_random_is_clamped() {
        let rng = FixedRandom::new(5_000);
        assert_eq!(rng.jitter_ms(1_000), 1_000);
        assert_eq!(rng.jitter_ms(0), 0);
        assert_eq!(rng.pick(2), 0);
        assert_eq!(rng.pick(2), 1);
        assert_eq!(rng.pick(2), 0);
        assert_eq!(rng.jitter_draws(), 2);
    }
}
