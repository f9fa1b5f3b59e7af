//! In-process at-least-once event bus.
//!
//! Publishing a raw message queues one delivery per registered handler.
//! [`EventBus::drain`] runs ready deliveries in batches of at most
//! `max_concurrency`; a batch runs every delivery on its own scoped thread,
//! so the handlers for one event run concurrently. Failures are classified
//! per delivery:
//!
//! - retryable failures are queued again, not before the redelivery
//!   policy's backoff delay, until its `max_attempts` is reached
//! - everything else, and exhausted retries, become dead letters
//!
//! A message that does not decode is dead-lettered on its first attempt.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::codec::{self, StateChangeEvent};
use crate::error::{ErrorCode, SyncError};
use crate::handlers::{Outcome, SyncContext, SyncHandler, dispatch};
use crate::ticketing::RetryPolicy;

/// Deliveries run at once when no limit is configured.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// First redelivery delay when no policy is configured.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Delivery {
    handler: usize,
    message: String,
    attempt: u32,
    /// Earliest redelivery time; `None` for first attempts.
    not_before: Option<Instant>,
}

impl Delivery {
    fn is_ready(&self, now: Instant) -> bool {
        self.not_before.is_none_or(|at| at <= now)
    }
}

/// A delivery that will not be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub handler: &'static str,
    pub message: String,
    pub attempts: u32,
    pub code: ErrorCode,
    pub error: String,
}

/// One finished delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub handler: &'static str,
    pub outcome: Outcome,
    pub attempts: u32,
}

/// Summary of one [`EventBus::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusReport {
    pub outcomes: Vec<HandlerOutcome>,
    pub dead_letters: Vec<DeadLetter>,
    /// Deliveries queued again after a retryable failure.
    pub retried: usize,
}

impl BusReport {
    /// Outcome recorded for `handler`, if it finished.
    #[must_use]
    pub fn outcome_of(&self, handler: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|entry| entry.handler == handler)
            .map(|entry| &entry.outcome)
    }

    #[must_use]
    pub fn synced(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| entry.outcome == Outcome::Synced)
            .count()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dead_letters.is_empty()
    }
}

/// Bus delivering messages to a fixed handler set.
pub struct EventBus<'a> {
    ctx: SyncContext<'a>,
    handlers: Vec<Box<dyn SyncHandler>>,
    pending: VecDeque<Delivery>,
    redelivery: RetryPolicy,
    max_concurrency: usize,
}

impl std::fmt::Debug for EventBus<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("pending", &self.pending.len())
            .field("redelivery", &self.redelivery)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl<'a> EventBus<'a> {
    /// Bus retrying each delivery up to `max_attempts` times with the
    /// default backoff and concurrency limit.
    #[must_use]
    pub fn new(
        ctx: SyncContext<'a>,
        handlers: Vec<Box<dyn SyncHandler>>,
        max_attempts: u32,
    ) -> Self {
        Self {
            ctx,
            handlers,
            pending: VecDeque::new(),
            redelivery: RetryPolicy {
                max_attempts: max_attempts.max(1),
                base_delay: DEFAULT_REDELIVERY_DELAY,
                max_delay: RetryPolicy::default().max_delay,
            },
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Replace the redelivery attempt budget and backoff.
    #[must_use]
    pub fn with_redelivery(mut self, policy: RetryPolicy) -> Self {
        self.redelivery = RetryPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        self
    }

    /// Cap the deliveries (and threads) running at once.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Queue a raw (encoded) message for every handler.
    pub fn publish(&mut self, message: &str) {
        for handler in 0..self.handlers.len() {
            self.pending.push_back(Delivery {
                handler,
                message: message.to_string(),
                attempt: 1,
                not_before: None,
            });
        }
    }

    /// Encode and queue an event.
    ///
    /// # Errors
    ///
    /// Returns [`codec::MalformedEvent`] when the event cannot be encoded;
    /// nothing is queued then.
    pub fn publish_event(&mut self, event: &StateChangeEvent) -> Result<(), codec::MalformedEvent> {
        self.publish(&codec::encode_event(event)?);
        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Deliver everything queued, including retries, and report.
    pub fn drain(&mut self) -> BusReport {
        let mut report = BusReport::default();

        while !self.pending.is_empty() {
            let batch = self.next_batch();
            if batch.is_empty() {
                self.wait_for_ready();
                continue;
            }
            let results = self.run_batch(batch);

            for (delivery, result) in results {
                let name = self.handlers[delivery.handler].name();
                match result {
                    Ok(outcome) => report.outcomes.push(HandlerOutcome {
                        handler: name,
                        outcome,
                        attempts: delivery.attempt,
                    }),
                    Err(err)
                        if err.is_retryable() && self.redelivery.allows_retry(delivery.attempt) =>
                    {
                        let wait = self.redelivery.delay(delivery.attempt, None);
                        warn!(
                            handler = name,
                            attempt = delivery.attempt,
                            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                            code = %err.code(),
                            error = %err,
                            "delivery failed, requeueing"
                        );
                        report.retried += 1;
                        self.pending.push_back(Delivery {
                            attempt: delivery.attempt + 1,
                            not_before: Some(Instant::now() + wait),
                            ..delivery
                        });
                    }
                    Err(err) => {
                        error!(
                            handler = name,
                            attempts = delivery.attempt,
                            code = %err.code(),
                            error = %err,
                            "delivery dead-lettered"
                        );
                        report.dead_letters.push(DeadLetter {
                            handler: name,
                            message: delivery.message,
                            attempts: delivery.attempt,
                            code: err.code(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        debug!(
            finished = report.outcomes.len(),
            dead = report.dead_letters.len(),
            retried = report.retried,
            "bus drained"
        );
        report
    }

    /// Take up to `max_concurrency` ready deliveries, keeping queue order.
    fn next_batch(&mut self) -> Vec<Delivery> {
        let now = Instant::now();
        let mut batch = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        while let Some(delivery) = self.pending.pop_front() {
            if batch.len() < self.max_concurrency && delivery.is_ready(now) {
                batch.push(delivery);
            } else {
                waiting.push_back(delivery);
            }
        }
        self.pending = waiting;
        batch
    }

    /// Sleep until the earliest queued redelivery is due.
    fn wait_for_ready(&self) {
        let now = Instant::now();
        let Some(wait) = self
            .pending
            .iter()
            .filter_map(|delivery| delivery.not_before)
            .min()
            .map(|at| at.saturating_duration_since(now))
        else {
            return;
        };
        debug!(
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            queued = self.pending.len(),
            "waiting for redelivery backoff"
        );
        thread::sleep(wait);
    }

    fn run_batch(&self, batch: Vec<Delivery>) -> Vec<(Delivery, Result<Outcome, DeliveryError>)> {
        let ctx = &self.ctx;
        thread::scope(|scope| {
            let running: Vec<_> = batch
                .into_iter()
                .map(|delivery| {
                    let handler = self.handlers[delivery.handler].as_ref();
                    let message = delivery.message.clone();
                    let join = scope.spawn(move || deliver(handler, ctx, &message));
                    (delivery, join)
                })
                .collect();

            running
                .into_iter()
                .map(|(delivery, join)| {
                    let result = join.join().unwrap_or_else(|_| Err(DeliveryError::Panicked));
                    (delivery, result)
                })
                .collect()
        })
    }
}

/// Failure of one delivery, including handler panics.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("handler panicked")]
    Panicked,
}

impl DeliveryError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Sync(err) => err.code(),
            Self::Panicked => ErrorCode::InternalUnexpected,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Sync(err) => err.is_retryable(),
            Self::Panicked => false,
        }
    }
}

/// Decode one raw message and run one handler on it.
///
/// # Errors
///
/// Returns [`SyncError::MalformedEvent`] for undecodable messages and any
/// error [`dispatch`] propagates.
pub fn deliver(
    handler: &dyn SyncHandler,
    ctx: &SyncContext<'_>,
    message: &str,
) -> Result<Outcome, DeliveryError> {
    let event = codec::decode(message).map_err(|err| {
        warn!(handler = handler.name(), error = %err, "malformed state-change message");
        SyncError::from(err)
    })?;
    Ok(dispatch(handler, ctx, &event)?)
}
