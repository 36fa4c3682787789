//! Cooperating flight - the heart of single-flight coordination
//!
//! One flight exists per key, shared by every task currently interested in
//! that key's result. The first task (the lead) runs the operation directly;
//! the rest wait on the shared result cell with policy-governed, staggered
//! timeouts, and may take over if the lead appears stuck. No lock is ever
//! held while the operation runs: the only shared mutable state is an atomic
//! participant counter and an atomic stagger clock, both driven by
//! compare-and-swap retry loops.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::coop::cell::ResultCell;
use crate::core::context::{Attempt, CallContext};
use crate::core::errors::ConvoyError;
use crate::core::policy::Policy;

/// Shared execution state for one cooperation key.
pub struct CooperatingFlight<K, T, E> {
    key: K,
    policy: Policy,
    cell: ResultCell<T, E>,
    /// Tasks currently admitted to this flight, the lead included.
    participants: AtomicU32,
    /// The admission counted at construction, not yet claimed by
    /// [`call`](Self::call).
    lead_admission: AtomicBool,
    /// Virtual wake-up clock, nanoseconds since `stagger_epoch`. Advancing it
    /// by at least the requested gap on every read spaces out concurrent
    /// failover attempts instead of letting them all retry at once.
    stagger_nanos: AtomicU64,
    stagger_epoch: Instant,
}

/// RAII admission to a flight; departure is the drop.
#[derive(Debug)]
struct Participation<'a> {
    participants: &'a AtomicU32,
}

impl<'a> Participation<'a> {
    /// Take ownership of an admission that was already counted.
    fn adopt(participants: &'a AtomicU32) -> Self {
        Self { participants }
    }
}

impl Drop for Participation<'_> {
    fn drop(&mut self) {
        self.participants.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<K, T, E> CooperatingFlight<K, T, E>
where
    K: fmt::Debug,
    T: Clone,
    E: Clone + From<ConvoyError>,
{
    /// Create the flight for a key. The creating task is the designated lead
    /// and holds the first admission, released when [`call`](Self::call)
    /// returns; the counter therefore starts at 1.
    pub fn new(key: K, policy: Policy) -> Self {
        Self {
            key,
            policy,
            cell: ResultCell::new(),
            participants: AtomicU32::new(1),
            lead_admission: AtomicBool::new(true),
            stagger_nanos: AtomicU64::new(0),
            stagger_epoch: Instant::now(),
        }
    }

    /// Key this flight coordinates on, for logging and tracing.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Tasks currently admitted, the lead included.
    pub fn participant_count(&self) -> u32 {
        self.participants.load(Ordering::Acquire)
    }

    /// Whether a terminal result (or abandonment) has been published.
    pub fn is_settled(&self) -> bool {
        self.cell.is_settled()
    }

    /// Abandon a still-pending flight, waking every waiter with `Cancelled`.
    pub fn abandon(&self) -> bool {
        self.cell.abandon()
    }

    /// Lead path: run the operation on the calling task and publish its
    /// outcome. Blocks only for the duration of the operation itself, never
    /// on other participants.
    ///
    /// The outcome returned is always the operation's own, even when some
    /// failed-over waiter already published a different result to the shared
    /// cell in the meantime.
    ///
    /// The first `call` claims the admission counted at construction; any
    /// later `call` on the same flight is admitted like a waiter, subject to
    /// the participant limit.
    pub async fn call<F, Fut>(&self, context: CallContext, op: F) -> Result<T, E>
    where
        F: FnOnce(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _lead = if self.lead_admission.swap(false, Ordering::AcqRel) {
            Participation::adopt(&self.participants)
        } else {
            self.join()?
        };
        self.perform(context, op, false).await
    }

    /// Waiter path: join the flight and wait for the lead's result.
    ///
    /// Admission is bounded by `policy.max_participants` and rejected with
    /// [`ConvoyError::Busy`] before any waiting begins. An outermost caller
    /// waits once, up to the major timeout, then gets
    /// [`ConvoyError::Timeout`]. A nested caller waits up to a staggered
    /// minor timeout and then fails over: it runs the operation itself
    /// (at most once, never a loop) and returns that fresh outcome to its
    /// own caller, regardless of which write wins the shared cell. That
    /// divergence is safe for the idempotent operations this facility is
    /// meant for.
    pub async fn cooperate<F, Fut>(&self, context: CallContext, op: F) -> Result<T, E>
    where
        F: FnOnce(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _participation = self.join()?;

        let (timeout, failover_allowed) = if context.is_nested() {
            (self.policy.minor_timeout, true)
        } else {
            (self.policy.major_timeout, false)
        };

        let Some(limit) = timeout else {
            return self.await_result().await;
        };

        let wait = if failover_allowed {
            self.stagger_timeout(limit)
        } else {
            limit
        };

        match tokio::time::timeout(wait, self.await_result()).await {
            Ok(outcome) => outcome,
            Err(_elapsed) if failover_allowed => {
                debug!(key = ?self.key, waited = ?wait, "lead appears stuck, taking over");
                self.perform(context, op, true).await
            }
            Err(_elapsed) => {
                debug!(key = ?self.key, waited = ?wait, "timed out waiting for lead");
                Err(ConvoyError::timeout(self.key_label(), wait).into())
            }
        }
    }

    /// Advance the shared stagger clock by at least `gap` and return how long
    /// the caller should wait to wake at the claimed slot.
    ///
    /// Successive callers claim strictly later wake-ups, at least `gap`
    /// apart, so near-simultaneous failovers spread out instead of retrying
    /// in lock-step. The returned duration is never negative; it can be zero
    /// when the clock has fallen behind the present.
    pub fn stagger_timeout(&self, gap: Duration) -> Duration {
        let gap = gap.as_nanos() as u64;
        let now = self.stagger_epoch.elapsed().as_nanos() as u64;
        let mut prev = self.stagger_nanos.load(Ordering::Relaxed);
        loop {
            let staggered = prev.saturating_add(gap).max(now);
            match self.stagger_nanos.compare_exchange_weak(
                prev,
                staggered,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Duration::from_nanos(staggered - now),
                Err(current) => prev = current,
            }
        }
    }

    /// Run the operation and publish its outcome if the cell is still
    /// pending. Always returns the operation's own outcome.
    async fn perform<F, Fut>(&self, context: CallContext, op: F, failover: bool) -> Result<T, E>
    where
        F: FnOnce(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let outcome = op(Attempt {
            context: context.nested(),
            failover,
        })
        .await;

        if self.cell.complete(outcome.clone()) {
            trace!(key = ?self.key, ok = outcome.is_ok(), failover, "published terminal result");
        } else {
            trace!(key = ?self.key, "result already published, keeping our own outcome");
        }
        outcome
    }

    async fn await_result(&self) -> Result<T, E> {
        match self.cell.wait().await {
            Some(outcome) => outcome,
            None => Err(ConvoyError::cancelled(self.key_label()).into()),
        }
    }

    /// Bounded admission. The count is checked before the increment, so it
    /// never exceeds the limit even transiently.
    fn join(&self) -> Result<Participation<'_>, ConvoyError> {
        let limit = self.policy.max_participants;
        let mut count = self.participants.load(Ordering::Relaxed);
        loop {
            if limit > 0 && count >= limit {
                debug!(key = ?self.key, count, limit, "cooperation maxed out, rejecting");
                return Err(ConvoyError::busy(self.key_label(), limit));
            }
            match self.participants.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(Participation::adopt(&self.participants)),
                Err(current) => count = current,
            }
        }
    }

    fn key_label(&self) -> String {
        format!("{:?}", self.key)
    }
}

impl<K, T, E> fmt::Debug for CooperatingFlight<K, T, E>
where
    K: fmt::Debug,
    T: Clone,
    E: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooperatingFlight")
            .field("key", &self.key)
            .field("participants", &self.participants.load(Ordering::Relaxed))
            .field("settled", &self.cell.is_settled())
            .finish()
    }
}
