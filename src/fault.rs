//! The error taxonomy of the engine.
//!
//! Every failure a test run can observe is a [`Fault`]: errors raised by test
//! bodies, the synthetic timeout, and failures inside the evaluation harness
//! itself (`map()`/`check()` raising instead of answering). Faults carry a
//! [`FaultKind`] so throws-based pass criteria can match on the kind the way
//! an exception class would be matched.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Type-safe fault classification. Throws-based tests match against these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// A value had the wrong type for the operation.
    Type,
    /// Malformed input (bad pattern, unparseable payload).
    Syntax,
    /// A value fell outside its permitted range.
    Range,
    /// Something was looked up that does not exist.
    Reference,
    /// An assertion made by the test body itself failed.
    Assertion,
    /// The engine stopped waiting for the test.
    Timeout,
    /// Anything else.
    Other,
}

impl FaultKind {
    pub fn name(&self) -> &'static str {
        match self {
            FaultKind::Type => "TypeError",
            FaultKind::Syntax => "SyntaxError",
            FaultKind::Range => "RangeError",
            FaultKind::Reference => "ReferenceError",
            FaultKind::Assertion => "AssertionError",
            FaultKind::Timeout => "TimeoutError",
            FaultKind::Other => "Error",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single recoverable failure: what kind it is and what happened.
///
/// Faults never propagate out of the scheduler; they are captured on the
/// result node that observed them and surface as failure details.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Type, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Syntax, message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Range, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Reference, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Assertion, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Other, message)
    }

    /// The synthetic fault recorded when a test outlives its timeout budget.
    pub fn timeout(budget: Duration) -> Self {
        Self::new(
            FaultKind::Timeout,
            format!("Test timed out after {}ms", budget.as_millis()),
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FaultKind::Timeout
    }

    /// A fault raised by the test's `map` transform rather than its body.
    pub(crate) fn map_failed(inner: &Fault) -> Self {
        Self::other(format!("map() failed. {}", inner.message))
    }

    /// A fault raised by the test's `check` comparator rather than its body.
    pub(crate) fn check_failed(inner: &Fault, mapped: bool) -> Self {
        let qualifier = if mapped {
            " (working with mapped values)"
        } else {
            ""
        };
        Self::other(format!("check() failed{}. {}", qualifier, inner.message))
    }
}

/// Predicate form of a throws criterion.
pub type ThrowsPredicate = Arc<dyn Fn(&Fault) -> bool + Send + Sync>;

/// Expected-exception policy for a test.
#[derive(Clone)]
pub enum Throws {
    /// Any fault passes.
    Any,
    /// No fault may occur.
    Forbidden,
    /// The fault must be of this kind.
    Kind(FaultKind),
    /// The fault must satisfy the predicate.
    Predicate(ThrowsPredicate),
}

impl Throws {
    pub fn predicate(f: impl Fn(&Fault) -> bool + Send + Sync + 'static) -> Self {
        Throws::Predicate(Arc::new(f))
    }
}

impl From<bool> for Throws {
    fn from(expected: bool) -> Self {
        if expected {
            Throws::Any
        } else {
            Throws::Forbidden
        }
    }
}

impl From<FaultKind> for Throws {
    fn from(kind: FaultKind) -> Self {
        Throws::Kind(kind)
    }
}

impl fmt::Debug for Throws {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throws::Any => write!(f, "Throws::Any"),
            Throws::Forbidden => write!(f, "Throws::Forbidden"),
            Throws::Kind(kind) => write!(f, "Throws::Kind({})", kind),
            Throws::Predicate(_) => write!(f, "Throws::Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_carries_kind_name() {
        let f = Fault::type_error("not a number");
        assert_eq!(f.to_string(), "TypeError: not a number");
        assert_eq!(
            Fault::timeout(Duration::from_millis(100)).to_string(),
            "TimeoutError: Test timed out after 100ms"
        );
    }

    #[test]
    fn harness_faults_are_distinct() {
        let inner = Fault::other("boom");
        assert!(Fault::map_failed(&inner).message.starts_with("map() failed."));
        assert!(Fault::check_failed(&inner, true)
            .message
            .contains("(working with mapped values)"));
    }
}
