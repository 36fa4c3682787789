//! Call-context marker distinguishing outermost from nested cooperation.
//!
//! Instead of an implicit thread-local "already inside a call" flag, the
//! context is an explicit value threaded through the call chain: `call` and
//! `cooperate` hand the operation a nested child context, and any cooperation
//! the operation issues with that context is treated as a nested dependency.

/// Marks whether the current cooperation attempt is a task's outermost one
/// or a nested dependency of an outer call.
///
/// Outermost attempts get the longer major timeout and exactly one
/// non-failover wait, so an outer caller does not multiply retries. Nested
/// attempts get the shorter minor timeout and may fail over, because
/// blocking outer work indefinitely on an inner dependency is unacceptable
/// while failing it immediately is too aggressive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    nested: bool,
}

impl CallContext {
    /// Context for a task's outermost cooperation attempt.
    pub fn root() -> Self {
        Self { nested: false }
    }

    /// Derive the context to thread into work performed on behalf of this
    /// one. Nesting is sticky: a child of a nested context stays nested.
    pub fn nested(self) -> Self {
        Self { nested: true }
    }

    pub fn is_nested(self) -> bool {
        self.nested
    }
}

/// Argument handed to a cooperating operation when it is actually invoked.
#[derive(Debug, Clone, Copy)]
pub struct Attempt {
    /// Context to pass along to any cooperation the operation issues itself.
    pub context: CallContext,
    /// True only when a waiter gave up on the lead and is re-running the
    /// operation itself.
    pub failover: bool,
}

impl Attempt {
    pub fn is_failover(&self) -> bool {
        self.failover
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_context_is_not_nested() {
        assert!(!CallContext::root().is_nested());
        assert_eq!(CallContext::default(), CallContext::root());
    }

    #[test]
    fn test_nesting_is_sticky() {
        let inner = CallContext::root().nested();
        assert!(inner.is_nested());
        assert!(inner.nested().is_nested());
    }
}
