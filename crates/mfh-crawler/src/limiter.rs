use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Instant};

use crate::config::Throttle;

/// Process-wide politeness limiter shared by every request to the origin.
///
/// Clones share the same clock, so the configured spacing holds regardless of
/// how many crawl tasks are in flight.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Option<Arc<Semaphore>>,
    spacing: Option<Duration>,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

/// Held for the duration of a request, released on drop.
#[derive(Debug)]
pub struct Permit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(throttle: Option<Throttle>) -> Self {
        let (permits, spacing) = match throttle {
            None => (None, None),
            Some(Throttle::Concurrent(n)) => (Some(Arc::new(Semaphore::new(n.max(1)))), None),
            Some(Throttle::PerSecond(0)) => (None, None),
            Some(Throttle::PerSecond(n)) => (
                None,
                Some(Duration::from_secs(1) / u32::try_from(n).unwrap_or(u32::MAX)),
            ),
            Some(Throttle::Delay(secs)) => (
                None,
                Some(Duration::try_from_secs_f32(secs).unwrap_or_default()),
            ),
        };

        Self {
            permits,
            spacing: spacing.filter(|d| !d.is_zero()),
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn spacing(&self) -> Option<Duration> {
        self.spacing
    }

    /// Waits until the next request slot is available.
    pub async fn acquire(&self) -> Permit {
        let permit = match &self.permits {
            Some(permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };

        if let Some(spacing) = self.spacing {
            let mut next_slot = self.next_slot.lock().await;
            if let Some(at) = *next_slot {
                if at > Instant::now() {
                    time::sleep_until(at).await;
                }
            }
            *next_slot = Some(Instant::now() + spacing);
        }

        Permit { _permit: permit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn delay_spaces_consecutive_requests() {
        let limiter = RateLimiter::new(Some(Throttle::Delay(0.5)));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_the_clock() {
        let limiter = RateLimiter::new(Some(Throttle::PerSecond(2)));
        let other = limiter.clone();
        let start = Instant::now();
        limiter.acquire().await;
        other.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn concurrent_bounds_in_flight_requests() {
        let limiter = RateLimiter::new(Some(Throttle::Concurrent(1)));
        let held = limiter.acquire().await;
        let pending = time::timeout(Duration::from_millis(20), limiter.acquire()).await;
        assert!(pending.is_err());
        drop(held);
        assert!(time::timeout(Duration::from_millis(20), limiter.acquire())
            .await
            .is_ok());
    }

    #[test]
    fn huge_rates_saturate_instead_of_wrapping() {
        let rate = RateLimiter::new(Some(Throttle::PerSecond((u32::MAX as usize).saturating_add(1))));
        assert!(rate.spacing().is_none());
        let rate = RateLimiter::new(Some(Throttle::PerSecond(usize::MAX)));
        assert!(rate.spacing().is_none());
        let rate = RateLimiter::new(Some(Throttle::PerSecond(1_000)));
        assert_eq!(rate.spacing(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn degenerate_throttles_disable_spacing() {
        assert!(RateLimiter::new(Some(Throttle::Delay(-1.0))).spacing().is_none());
        assert!(RateLimiter::new(Some(Throttle::PerSecond(0))).spacing().is_none());
        assert!(RateLimiter::unlimited().spacing().is_none());
    }
}
