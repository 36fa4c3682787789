//! Fluent configuration for cooperation scopes.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use crate::coop::registry::Cooperation;
use crate::core::errors::ConvoyError;
use crate::core::policy::Policy;

/// Builder for [`Cooperation`] scopes.
///
/// One builder is usually configured per subsystem (e.g. from proxy
/// settings) and then used to build a scope per repository.
#[derive(Debug, Clone)]
pub struct CooperationBuilder {
    policy: Policy,
    enabled: bool,
}

impl Default for CooperationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CooperationBuilder {
    pub fn new() -> Self {
        Self {
            policy: Policy::default(),
            enabled: true,
        }
    }

    /// Replace the whole policy at once.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether callers should cooperate at all; a disabled scope runs every
    /// caller's operation directly.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Wait budget for outermost cooperation attempts; `None` waits
    /// indefinitely.
    pub fn major_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.policy.major_timeout = timeout;
        self
    }

    /// Wait budget for nested cooperation attempts before failover; `None`
    /// waits indefinitely.
    pub fn minor_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.policy.minor_timeout = timeout;
        self
    }

    /// Cap on tasks admitted per key; 0 means unbounded.
    pub fn max_participants(mut self, limit: u32) -> Self {
        self.policy.max_participants = limit;
        self
    }

    /// Build a cooperation scope, validating the configured policy.
    pub fn build<K, T, E>(self, scope: impl Into<String>) -> Result<Cooperation<K, T, E>, ConvoyError>
    where
        K: Clone + Eq + Hash + fmt::Debug,
        T: Clone,
        E: Clone + From<ConvoyError>,
    {
        self.policy.validate()?;
        Ok(Cooperation::with_enabled(scope, self.policy, self.enabled))
    }
}
