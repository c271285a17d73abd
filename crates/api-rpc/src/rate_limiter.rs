//! Rate Limiter (Token Bucket)
//!
//! Guards the mutating RPC methods. State is one packed atomic word so the
//! hot path never takes a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Fixed-point scale: the bucket counts thousandths of a token
const MILLI: u64 = 1000;

/// Token bucket with `burst` capacity refilled at `per_sec` tokens per second
pub struct RateLimiter {
    // Upper 32 bits: milli-tokens. Lower 32 bits: ms since `origin` (wrapping).
    packed: AtomicU64,
    origin: Instant,
    capacity_milli: u64,
    per_sec: u64,
}

fn pack(milli_tokens: u64, at_ms: u32) -> u64 {
    (milli_tokens << 32) | u64::from(at_ms)
}

fn unpack(packed: u64) -> (u64, u32) {
    (packed >> 32, (packed & 0xFFFF_FFFF) as u32)
}

impl RateLimiter {
    pub fn new(burst: u32, per_sec: u32) -> Self {
        let capacity_milli = (u64::from(burst) * MILLI).min(u64::from(u32::MAX));
        Self {
            packed: AtomicU64::new(pack(capacity_milli, 0)),
            origin: Instant::now(),
            capacity_milli,
            per_sec: u64::from(per_sec),
        }
    }

    // Truncation wraps every ~49 days; deltas use wrapping_sub
    fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }

    /// Take one token; false means the caller is throttled
    pub fn try_acquire(&self) -> bool {
        loop {
            let current = self.packed.load(Ordering::Acquire);
            let (milli, last_ms) = unpack(current);
            let now = self.now_ms();
            let elapsed = u64::from(now.wrapping_sub(last_ms));

            // ms * tokens/s = milli-tokens
            let refilled = milli
                .saturating_add(elapsed.saturating_mul(self.per_sec))
                .min(self.capacity_milli);
            let (left, allowed) = if refilled >= MILLI {
                (refilled - MILLI, true)
            } else {
                (refilled, false)
            };

            if self
                .packed
                .compare_exchange(current, pack(left, now), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return allowed;
            }
        }
    }

    /// Whole tokens left as of the last update
    pub fn remaining(&self) -> u64 {
        unpack(self.packed.load(Ordering::Acquire)).0 / MILLI
    }
}
