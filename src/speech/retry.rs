use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use crate::foundation::error::{ReelError, ReelResult};

/// Bounded exponential backoff for transient synthesis failures.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Shared flag that aborts a run. Cloning yields a handle to the same flag.
///
/// A [`CancelToken::child`] also observes every ancestor, but cancelling it leaves the ancestors
/// untouched.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Arc::clone(&self.flag));
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            ancestors,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.ancestors.iter().any(|a| a.load(Ordering::SeqCst))
    }

    pub fn check(&self) -> ReelResult<()> {
        if self.is_cancelled() {
            Err(ReelError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `d`, waking early (with `Cancelled`) if the token fires.
    pub fn sleep(&self, d: Duration) -> ReelResult<()> {
        let deadline = Instant::now() + d;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(25)));
        }
    }
}

/// Retries left for one run, shared by every request the run issues.
#[derive(Debug)]
pub struct RetryBudget {
    max: u32,
    left: AtomicU32,
}

impl RetryBudget {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max: max_retries,
            left: AtomicU32::new(max_retries),
        }
    }

    /// Claim one retry; `false` once the budget is spent.
    pub fn try_take(&self) -> bool {
        self.left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn spent(&self) -> u32 {
        self.max - self.left.load(Ordering::SeqCst)
    }
}

/// A value plus the number of retries it took.
#[derive(Clone, Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub retries: u32,
}

/// Run `op` until it succeeds, fails fatally, or `budget` runs out of transient retries.
///
/// `op` receives the 0-based attempt number.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    budget: &RetryBudget,
    cancel: &CancelToken,
    label: &str,
    mut op: impl FnMut(u32) -> ReelResult<T>,
) -> ReelResult<Attempted<T>> {
    let mut attempt = 0u32;
    loop {
        cancel.check()?;
        match op(attempt) {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    retries: attempt,
                });
            }
            Err(err) if err.is_transient() && budget.try_take() => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    %label,
                    retry = attempt,
                    run_retries = budget.spent(),
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient synthesis failure; retrying"
                );
                cancel.sleep(delay)?;
            }
            Err(err) => return Err(err),
        }
    }
}
