//! Bandwidth ceiling for a byte stream.
//!
//! A ticker task releases one permit per KiB of budget at
//! `ceil(max_bytes_per_second / 1024)` Hz into a single-slot channel, so
//! idle time never accrues credit. The transfer loop settles each read by
//! awaiting one permit per KiB consumed before the next read; the first
//! read of a burst may overshoot by at most one buffer, which is accepted
//! (this is a ceiling, not a scheduler).

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;

pub struct RateLimiter {
    permits: mpsc::Receiver<()>,
}

impl RateLimiter {
    /// `max_bytes_per_second` below one permit's worth is raised to 1024 so
    /// the ticker always runs.
    pub fn new(max_bytes_per_second: u64) -> Self {
        let rate = max_bytes_per_second.max(1024);
        let hz = rate.div_ceil(1024);
        let period = Duration::from_secs_f64(1.0 / hz as f64);

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                match tx.try_send(()) {
                    // A full slot means the consumer is behind; the permit
                    // is dropped rather than banked.
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => break,
                }
            }
        });

        Self { permits: rx }
    }

    /// Settle `bytes` just consumed from the stream: awaits one permit per
    /// started KiB. Returns immediately once the budget is paid.
    pub async fn throttle(&mut self, bytes: usize) {
        let owed = (bytes as u64).div_ceil(1024).max(1);
        for _ in 0..owed {
            if self.permits.recv().await.is_none() {
                // Ticker gone (runtime shutdown); stop throttling.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn throttle_paces_reads_to_the_ceiling() {
        // 2048 B/s -> 2 permits per second, one every 500 ms.
        let mut limiter = RateLimiter::new(2048);
        // Absorb the immediate first tick.
        limiter.throttle(1024).await;

        let start = Instant::now();
        // 4 KiB owes 4 permits: 2 seconds at 2 Hz.
        limiter.throttle(4096).await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(1900),
            "expected ~2s of pacing, got {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_does_not_accrue_credit() {
        let mut limiter = RateLimiter::new(4096); // 4 permits/sec
        limiter.throttle(1024).await;

        // A long idle gap banks at most one permit.
        tokio::time::sleep(Duration::from_secs(10)).await;

        let start = Instant::now();
        limiter.throttle(4096).await; // 4 permits owed
        let elapsed = start.elapsed();
        // One banked permit at most: at least 3 ticks (750 ms) still paced.
        assert!(
            elapsed >= Duration::from_millis(700),
            "burst credit leaked: {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn small_reads_owe_at_least_one_permit() {
        let mut limiter = RateLimiter::new(1024); // 1 permit/sec
        limiter.throttle(1).await; // immediate tick
        let start = Instant::now();
        limiter.throttle(1).await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
