//! Registry mapping cooperation keys to their shared in-progress flights.
//!
//! Exactly one flight exists per key at a time: the first caller creates it
//! and becomes the lead, every concurrent caller for the same key receives
//! the same instance, and the mapping is evicted once the lead finishes so a
//! later request starts a fresh flight instead of reusing a stale terminal
//! one.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::coop::flight::CooperatingFlight;
use crate::core::context::{Attempt, CallContext};
use crate::core::errors::ConvoyError;
use crate::core::policy::Policy;

/// Entry point for cooperative execution within one scope (for a repository
/// manager, typically one per repository facet, e.g. `"central:proxy"`).
pub struct Cooperation<K, T, E> {
    scope: String,
    policy: Policy,
    enabled: bool,
    flights: DashMap<K, Arc<CooperatingFlight<K, T, E>>>,
}

impl<K, T, E> Cooperation<K, T, E>
where
    K: Clone + Eq + Hash + fmt::Debug,
    T: Clone,
    E: Clone + From<ConvoyError>,
{
    pub fn new(scope: impl Into<String>, policy: Policy) -> Self {
        Self::with_enabled(scope, policy, true)
    }

    pub(crate) fn with_enabled(scope: impl Into<String>, policy: Policy, enabled: bool) -> Self {
        Self {
            scope: scope.into(),
            policy,
            enabled,
            flights: DashMap::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run `op` for `key`, sharing the execution with every concurrent caller
    /// of the same key.
    ///
    /// The first caller becomes the lead and runs `op` directly; the rest
    /// wait on the lead's result under the scope's [`Policy`]. Pass the
    /// [`CallContext`] received from an enclosing [`Attempt`] when this
    /// cooperation is issued on behalf of another one; pass
    /// [`CallContext::root()`] at the outermost call site.
    ///
    /// When the scope is disabled, every caller just runs `op` itself with no
    /// coordination.
    pub async fn cooperate<F, Fut>(&self, key: K, context: CallContext, op: F) -> Result<T, E>
    where
        F: FnOnce(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            trace!(scope = %self.scope, key = ?key, "cooperation disabled, calling through");
            return op(Attempt {
                context: context.nested(),
                failover: false,
            })
            .await;
        }

        let (flight, is_lead) = match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let flight = Arc::new(CooperatingFlight::new(key.clone(), self.policy.clone()));
                entry.insert(Arc::clone(&flight));
                debug!(scope = %self.scope, key = ?key, "starting cooperative flight");
                (flight, true)
            }
        };

        if is_lead {
            // the guard also covers this future being dropped mid-operation:
            // waiters are woken with `Cancelled` and the mapping is evicted so
            // the next caller leads a fresh flight
            let _lead = LeadGuard {
                scope: &self.scope,
                flights: &self.flights,
                key: &key,
                flight: &flight,
            };
            let outcome = flight.call(context, op).await;
            trace!(scope = %self.scope, key = ?key, "cooperative flight finished");
            outcome
        } else {
            flight.cooperate(context, op).await
        }
    }

    /// Snapshot of participants per in-progress key, for observability.
    pub fn participant_counts(&self) -> HashMap<K, u32> {
        self.flights
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().participant_count()))
            .collect()
    }

    /// Number of keys with an in-progress flight.
    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    /// Abandon every still-pending flight, surfacing `Cancelled` to parked
    /// waiters. Used on shutdown; leads already running their operation are
    /// not interrupted and still return their own outcome.
    pub fn abandon_pending(&self) {
        for entry in self.flights.iter() {
            if entry.value().abandon() {
                warn!(scope = %self.scope, key = ?entry.key(), "abandoned pending flight");
            }
        }
    }
}

/// Scope-exit guard for the lead path. On drop it abandons the flight if no
/// outcome was ever published (the lead future was dropped mid-operation)
/// and evicts the mapping, but only while it still points at this flight; a
/// failover lead may already have replaced it with a newer one.
struct LeadGuard<'a, K, T, E>
where
    K: Eq + Hash + fmt::Debug,
    T: Clone,
    E: Clone + From<ConvoyError>,
{
    scope: &'a str,
    flights: &'a DashMap<K, Arc<CooperatingFlight<K, T, E>>>,
    key: &'a K,
    flight: &'a Arc<CooperatingFlight<K, T, E>>,
}

impl<K, T, E> Drop for LeadGuard<'_, K, T, E>
where
    K: Eq + Hash + fmt::Debug,
    T: Clone,
    E: Clone + From<ConvoyError>,
{
    fn drop(&mut self) {
        if self.flight.abandon() {
            warn!(
                scope = %self.scope,
                key = ?self.key,
                "lead dropped before publishing, cancelling waiters"
            );
        }
        self.flights
            .remove_if(self.key, |_, current| Arc::ptr_eq(current, self.flight));
    }
}

impl<K: Eq + Hash, T, E> fmt::Debug for Cooperation<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cooperation")
            .field("scope", &self.scope)
            .field("enabled", &self.enabled)
            .field("flights", &self.flights.len())
            .finish()
    }
}
