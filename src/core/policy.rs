use crate::core::errors::ConvoyError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-use-site cooperation tunables.
///
/// Supplied by the call site (typically one policy per repository format or
/// proxy configuration), never by the flight itself. `None` timeouts mean
/// "wait indefinitely"; `max_participants == 0` means unbounded admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Wait budget for a task's outermost cooperation attempt. A task that
    /// exceeds it gets a single `Timeout` error, never a failover.
    pub major_timeout: Option<Duration>,
    /// Wait budget for a nested cooperation attempt (one issued while
    /// satisfying an outer call). Exceeding it triggers failover: the waiter
    /// runs the operation itself rather than stalling its outer work.
    pub minor_timeout: Option<Duration>,
    /// Maximum tasks that may be admitted to one flight at a time, the lead
    /// included. Protects a bounded worker pool from piling up on a hot key.
    pub max_participants: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            major_timeout: None,
            minor_timeout: Some(Duration::from_secs(30)),
            max_participants: 100,
        }
    }
}

impl Policy {
    pub fn new(
        major_timeout: Option<Duration>,
        minor_timeout: Option<Duration>,
        max_participants: u32,
    ) -> Self {
        Self {
            major_timeout,
            minor_timeout,
            max_participants,
        }
    }

    pub fn validate(&self) -> Result<(), ConvoyError> {
        if self.major_timeout == Some(Duration::ZERO) {
            return Err(ConvoyError::configuration(
                "major_timeout of zero would reject every wait; use None to wait indefinitely",
            ));
        }
        if self.minor_timeout == Some(Duration::ZERO) {
            return Err(ConvoyError::configuration(
                "minor_timeout of zero would fail over immediately; use None to wait indefinitely",
            ));
        }
        Ok(())
    }
}
