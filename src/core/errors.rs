use std::time::Duration;
use thiserror::Error;

/// Errors raised by the cooperation facility itself.
///
/// Failures of the underlying operation are never wrapped in this type: the
/// caller's own error type `E` carries them unchanged, and absorbs these
/// facility errors through a `From<ConvoyError>` impl. A cooperating caller
/// therefore cannot tell "I ran the operation myself" apart from "someone
/// else ran it and I inherited the outcome".
///
/// The enum is `Clone` + `Eq` because a single terminal error fans out to
/// every waiter sharing a flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvoyError {
    /// Admission rejected: the flight already has `limit` participants.
    /// Raised synchronously, before any waiting and without invoking the
    /// operation. Back off outside the facility and retry.
    #[error("cooperation maxed out for {key}: {limit} participants already admitted")]
    Busy { key: String, limit: u32 },

    /// An outermost wait exceeded the major timeout without permission to
    /// fail over. Distinct from any error the operation itself raises.
    #[error("gave up waiting {waited_ms}ms for a result of {key}")]
    Timeout { key: String, waited_ms: u64 },

    /// The wait was abandoned externally before a result was published.
    #[error("cooperation on {key} was abandoned before a result was published")]
    Cancelled { key: String },

    /// Invalid cooperation settings.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl ConvoyError {
    /// Create a busy/overloaded admission error
    pub fn busy(key: impl Into<String>, limit: u32) -> Self {
        Self::Busy {
            key: key.into(),
            limit,
        }
    }

    /// Create a timeout error for a wait that was not allowed to fail over
    pub fn timeout(key: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            key: key.into(),
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(key: impl Into<String>) -> Self {
        Self::Cancelled { key: key.into() }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if error is recoverable by retrying later
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Busy { .. } | Self::Timeout { .. } => true,
            Self::Cancelled { .. } | Self::Configuration { .. } => false,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "busy",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Configuration { .. } => "configuration",
        }
    }
}
