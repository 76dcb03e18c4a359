//! Dispatch loop: key selection, rotation, and retry
//!
//! Owns the control flow around upstream calls: parse the pool, select a
//! key, classify failures, rotate or back off, and surface a terminal
//! [`DispatchError`] once the pool or the retry budget is spent. The loop
//! never mutates shared state; each dispatch works on its own copy of the
//! pool, so exclusions vanish when the dispatch ends.

use std::future::Future;
use std::time::Duration;

use provider::CallFailure;
use rand::RngExt;
use rand::SeedableRng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::classify::{ClassifiedError, classify};
use crate::error::{DispatchError, Result};
use crate::pool::{KeyPool, fingerprint};

/// Drives keyed upstream calls to a terminal outcome.
///
/// Construction is cheap; services build one dispatcher per inbound
/// request. The RNG defaults to an OS-seeded [`rand::rngs::StdRng`] so the
/// dispatcher can live inside `Send` futures; tests swap in seeded or
/// constant RNGs via [`Dispatcher::with_rng`].
pub struct Dispatcher<R = rand::rngs::StdRng> {
    max_retries: u32,
    backoff: BackoffPolicy,
    rng: R,
    cancel: Option<watch::Receiver<bool>>,
}

impl Dispatcher {
    /// Dispatcher with the default backoff policy and an OS-seeded RNG.
    ///
    /// `max_retries` budgets the backoff-and-retry path; key rotations do
    /// not consume it.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffPolicy::default(),
            rng: rand::rngs::StdRng::try_from_rng(&mut rand::rngs::SysRng)
                .expect("failed to seed RNG from OS"),
            cancel: None,
        }
    }
}

impl<R: RngExt> Dispatcher<R> {
    /// Replace the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the RNG driving key selection and jitter.
    pub fn with_rng<R2: RngExt>(self, rng: R2) -> Dispatcher<R2> {
        Dispatcher {
            max_retries: self.max_retries,
            backoff: self.backoff,
            rng,
            cancel: self.cancel,
        }
    }

    /// Observe a cancellation flag.
    ///
    /// When the sender flips the flag to `true`, the dispatch abandons
    /// whatever it is doing: pending backoff timers are dropped, in-flight
    /// calls are no longer awaited, and no further key is selected.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run `call` against the key pool parsed from `raw_keys` until it
    /// succeeds or a terminal error is reached.
    ///
    /// `call` receives an owned key and performs one upstream attempt.
    /// Failures steer the loop:
    /// - a rejected key is excluded and another selected, with no delay and
    ///   no retry consumed; when it was the last key, the dispatch fails
    ///   with `InvalidCredentials`
    /// - a rate limit rotates to another key immediately while the pool has
    ///   one, then backs off on the final key until retries run out
    ///   (`QuotaExceeded`)
    /// - a provider outage backs off and retries the same pool, surfacing
    ///   `Unavailable` with the last failure once retries run out
    /// - anything unrecognized aborts at once with `Fatal`
    pub async fn execute<T, C, Fut>(&mut self, raw_keys: &str, mut call: C) -> Result<T>
    where
        C: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, CallFailure>>,
    {
        let mut pool = KeyPool::parse(raw_keys);
        let mut retries_left = self.max_retries;
        let mut attempt: u32 = 1;

        loop {
            if self.is_cancelled() {
                info!("dispatch cancelled before key selection");
                return Err(DispatchError::Cancelled);
            }

            let key = match pool.select_random(&mut self.rng) {
                Some(key) => key.to_string(),
                None => {
                    warn!("dispatch aborted: key pool is empty");
                    return Err(DispatchError::MissingCredentials);
                }
            };

            debug!(
                key = %fingerprint(&key),
                pool_size = pool.len(),
                attempt,
                "dispatching call"
            );

            let outcome = {
                let call_future = call(key.clone());
                tokio::select! {
                    biased;
                    _ = cancelled(self.cancel.as_mut()) => {
                        info!("dispatch cancelled during in-flight call");
                        return Err(DispatchError::Cancelled);
                    }
                    outcome = call_future => outcome,
                }
            };

            let failure = match outcome {
                Ok(value) => {
                    metrics::counter!("dispatch_attempts_total", "classification" => "ok")
                        .increment(1);
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            match classify(&failure) {
                ClassifiedError::InvalidKey => {
                    metrics::counter!("dispatch_attempts_total", "classification" => "invalid_key")
                        .increment(1);
                    if pool.len() > 1 {
                        warn!(
                            key = %fingerprint(&key),
                            remaining = pool.len() - 1,
                            "key rejected as invalid, rotating"
                        );
                        metrics::counter!("dispatch_key_rotations_total", "reason" => "invalid_key")
                            .increment(1);
                        // A bad key is not a retry: budget and attempt number
                        // carry over unchanged.
                        pool = pool.exclude(&key);
                        continue;
                    }
                    warn!(key = %fingerprint(&key), "last key rejected as invalid");
                    return Err(DispatchError::InvalidCredentials);
                }
                ClassifiedError::RateLimited { retry_after } => {
                    metrics::counter!("dispatch_attempts_total", "classification" => "rate_limited")
                        .increment(1);
                    if pool.len() > 1 {
                        info!(
                            key = %fingerprint(&key),
                            remaining = pool.len() - 1,
                            "rate limited, rotating to another key"
                        );
                        metrics::counter!("dispatch_key_rotations_total", "reason" => "rate_limited")
                            .increment(1);
                        pool = pool.exclude(&key);
                        attempt += 1;
                        continue;
                    }
                    if retries_left == 0 {
                        warn!(attempts = attempt, "rate limited with no keys or retries left");
                        return Err(DispatchError::QuotaExceeded);
                    }
                    retries_left -= 1;
                    let delay = self.backoff.delay_for(retry_after, attempt, &mut self.rng);
                    info!(
                        delay_ms = delay.as_millis() as u64,
                        hinted = retry_after.is_some(),
                        retries_left,
                        "rate limited, backing off"
                    );
                    self.sleep(delay).await?;
                    attempt += 1;
                }
                ClassifiedError::Unavailable => {
                    metrics::counter!("dispatch_attempts_total", "classification" => "unavailable")
                        .increment(1);
                    if retries_left == 0 {
                        warn!(
                            attempts = attempt,
                            error = %failure,
                            "provider unavailable, retries exhausted"
                        );
                        return Err(DispatchError::Unavailable {
                            attempts: attempt,
                            source: failure,
                        });
                    }
                    retries_left -= 1;
                    let delay = self.backoff.delay_for(None, attempt, &mut self.rng);
                    info!(
                        delay_ms = delay.as_millis() as u64,
                        retries_left,
                        "provider unavailable, backing off"
                    );
                    self.sleep(delay).await?;
                    attempt += 1;
                }
                ClassifiedError::Fatal => {
                    metrics::counter!("dispatch_attempts_total", "classification" => "fatal")
                        .increment(1);
                    warn!(error = %failure, "unrecognized provider failure, aborting dispatch");
                    return Err(DispatchError::Fatal { source: failure });
                }
            }
        }
    }

    async fn sleep(&mut self, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancelled(self.cancel.as_mut()) => {
                info!("dispatch cancelled during backoff");
                Err(DispatchError::Cancelled)
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Resolves when the cancellation flag flips to `true`. Pends forever when
/// no flag is wired or the sender side is gone, so an unconfigured
/// dispatcher is simply never cancelled.
async fn cancelled(cancel: Option<&mut watch::Receiver<bool>>) {
    match cancel {
        Some(rx) => {
            if rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
