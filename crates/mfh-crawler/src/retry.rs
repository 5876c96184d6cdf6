use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::{ErrorClass, FailureReason, FetchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    InFlight { attempt: u32 },
    BackoffWait { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    FailedPermanent { attempts: u32 },
    FailedExhausted { attempts: u32 },
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::FailedPermanent { .. } | Self::FailedExhausted { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&RetryConfig::default()).into()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts.max(1),
            base_delay: c.base_delay(),
            max_delay: c.max_delay(),
            jitter: c.jitter.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(factor.max(0.0))
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt budget
    /// is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, url: &str, mut op: F) -> Retried<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut machine = RetryMachine::new(self.clone());
        machine.start();

        loop {
            let attempt = machine.attempt();
            match op(attempt).await {
                Ok(value) => {
                    return Retried {
                        result: Ok(value),
                        state: machine.succeed(),
                    }
                }
                Err(e) => match machine.fail(e.class()) {
                    RetryState::BackoffWait { attempt, delay } => {
                        log::warn!(
                            "Attempt {attempt}/{} for {url} failed: {e}, retrying in {delay:?}",
                            self.max_attempts
                        );
                        tokio::time::sleep(delay).await;
                        machine.resume();
                    }
                    state => {
                        return Retried {
                            result: Err(e),
                            state,
                        }
                    }
                },
            }
        }
    }
}

/// Attempt accounting for a single fetch, one transition per event.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Pending,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        match self.state {
            RetryState::Pending => 0,
            RetryState::InFlight { attempt } | RetryState::BackoffWait { attempt, .. } => attempt,
            RetryState::Succeeded { attempts }
            | RetryState::FailedPermanent { attempts }
            | RetryState::FailedExhausted { attempts } => attempts,
        }
    }

    pub fn start(&mut self) -> RetryState {
        if self.state == RetryState::Pending {
            self.state = RetryState::InFlight { attempt: 1 };
        }
        self.state
    }

    pub fn succeed(&mut self) -> RetryState {
        if let RetryState::InFlight { attempt } = self.state {
            self.state = RetryState::Succeeded { attempts: attempt };
        }
        self.state
    }

    pub fn fail(&mut self, class: ErrorClass) -> RetryState {
        if let RetryState::InFlight { attempt } = self.state {
            self.state = match class {
                ErrorClass::Permanent => RetryState::FailedPermanent { attempts: attempt },
                ErrorClass::Transient if attempt >= self.policy.max_attempts => {
                    RetryState::FailedExhausted { attempts: attempt }
                }
                ErrorClass::Transient => RetryState::BackoffWait {
                    attempt,
                    delay: self.policy.jittered(self.policy.backoff(attempt)),
                },
            };
        }
        self.state
    }

    pub fn resume(&mut self) -> RetryState {
        if let RetryState::BackoffWait { attempt, .. } = self.state {
            self.state = RetryState::InFlight {
                attempt: attempt + 1,
            };
        }
        self.state
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, FetchError>,
    pub state: RetryState,
}

impl<T> Retried<T> {
    pub fn attempts(&self) -> u32 {
        match self.state {
            RetryState::Succeeded { attempts }
            | RetryState::FailedPermanent { attempts }
            | RetryState::FailedExhausted { attempts } => attempts,
            RetryState::InFlight { attempt } | RetryState::BackoffWait { attempt, .. } => attempt,
            RetryState::Pending => 0,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match (&self.result, self.state) {
            (Ok(_), _) => None,
            (Err(FetchError::RenderTimeout { .. }), RetryState::FailedExhausted { .. }) => {
                Some(FailureReason::RenderTimeout)
            }
            (Err(_), RetryState::FailedExhausted { .. }) => Some(FailureReason::RetryExhausted),
            (Err(_), _) => Some(FailureReason::Permanent),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use reqwest::StatusCode;

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    fn unavailable() -> FetchError {
        FetchError::Status {
            url: "https://example.com".into(),
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn not_found() -> FetchError {
        FetchError::Status {
            url: "https://example.com".into(),
            status: StatusCode::NOT_FOUND,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
        };
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(p.backoff(4), Duration::from_secs(5));
        assert_eq!(p.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_in_range() {
        let p = RetryPolicy {
            jitter: 0.1,
            ..policy(3)
        };
        for _ in 0..100 {
            let d = p.jittered(Duration::from_millis(1_000));
            assert!(d >= Duration::from_millis(900) && d <= Duration::from_millis(1_100));
        }
    }

    #[test]
    fn machine_walks_transient_failures_to_exhaustion() {
        let mut m = RetryMachine::new(policy(2));
        assert_eq!(m.start(), RetryState::InFlight { attempt: 1 });
        assert!(matches!(
            m.fail(ErrorClass::Transient),
            RetryState::BackoffWait { attempt: 1, .. }
        ));
        assert_eq!(m.resume(), RetryState::InFlight { attempt: 2 });
        assert_eq!(
            m.fail(ErrorClass::Transient),
            RetryState::FailedExhausted { attempts: 2 }
        );
        assert!(m.state().is_terminal());
    }

    #[test]
    fn machine_ignores_events_out_of_order() {
        let mut m = RetryMachine::new(policy(2));
        assert_eq!(m.fail(ErrorClass::Transient), RetryState::Pending);
        m.start();
        m.succeed();
        assert_eq!(m.resume(), RetryState::Succeeded { attempts: 1 });
    }

    #[tokio::test]
    async fn transient_failures_never_exceed_budget() {
        let calls = AtomicU32::new(0);
        let out: Retried<()> = policy(4)
            .run("https://example.com", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(unavailable()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(out.attempts(), 4);
        assert_eq!(out.failure_reason(), Some(FailureReason::RetryExhausted));
    }

    #[tokio::test]
    async fn permanent_failure_consumes_one_attempt() {
        let calls = AtomicU32::new(0);
        let out: Retried<()> = policy(4)
            .run("https://example.com", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(not_found()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.state, RetryState::FailedPermanent { attempts: 1 });
        assert_eq!(out.failure_reason(), Some(FailureReason::Permanent));
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let out = policy(3)
            .run("https://example.com", |attempt| async move {
                if attempt < 2 {
                    Err(unavailable())
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(out.result.unwrap(), 2);
        assert_eq!(out.state, RetryState::Succeeded { attempts: 2 });
    }

    #[tokio::test]
    async fn exhausted_render_timeouts_report_render_timeout() {
        let out: Retried<()> = policy(2)
            .run("https://example.com", |_| async {
                Err(FetchError::RenderTimeout {
                    url: "https://example.com".into(),
                    after: Duration::from_millis(1),
                })
            })
            .await;
        assert_eq!(out.failure_reason(), Some(FailureReason::RenderTimeout));
    }
}
