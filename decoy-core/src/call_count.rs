//! Expected call counts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// How a [`CallCount`] was constructed, kept for failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallCountKind {
    AtLeastOnce,
    AtLeast(usize),
    AtMost(usize),
    AtMostOnce,
    InclusiveBetween(usize, usize),
    ExclusiveBetween(usize, usize),
    Exactly(usize),
    Once,
    Never,
}

/// Closed range of acceptable call counts.
///
/// Equality and hashing only look at the resolved range, so `once()` equals
/// `exactly(1)`. An unbounded upper end is `usize::MAX`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CallCount {
    kind: CallCountKind,
    from: usize,
    to: usize,
}

impl CallCount {
    fn new(kind: CallCountKind, from: usize, to: usize) -> Self {
        Self { kind, from, to }
    }

    pub fn at_least_once() -> Self {
        Self::new(CallCountKind::AtLeastOnce, 1, usize::MAX)
    }

    pub fn at_least(n: usize) -> Self {
        Self::new(CallCountKind::AtLeast(n), n, usize::MAX)
    }

    pub fn at_most(n: usize) -> Self {
        Self::new(CallCountKind::AtMost(n), 0, n)
    }

    pub fn at_most_once() -> Self {
        Self::new(CallCountKind::AtMostOnce, 0, 1)
    }

    pub fn inclusive_between(from: usize, to: usize) -> Self {
        Self::new(CallCountKind::InclusiveBetween(from, to), from, to)
    }

    /// Open range `(from, to)`. `exclusive_between(3, 5)` only admits 4.
    pub fn exclusive_between(from: usize, to: usize) -> Self {
        Self::new(
            CallCountKind::ExclusiveBetween(from, to),
            from.saturating_add(1),
            to.saturating_sub(1),
        )
    }

    pub fn exactly(n: usize) -> Self {
        Self::new(CallCountKind::Exactly(n), n, n)
    }

    pub fn once() -> Self {
        Self::new(CallCountKind::Once, 1, 1)
    }

    pub fn never() -> Self {
        Self::new(CallCountKind::Never, 0, 0)
    }

    pub fn kind(&self) -> CallCountKind {
        self.kind
    }

    /// Resolved `[from, to]`.
    pub fn range(&self) -> (usize, usize) {
        (self.from, self.to)
    }

    /// Whether `count` calls satisfy this expectation.
    pub fn validate(&self, count: usize) -> bool {
        self.from <= count && count <= self.to
    }

    /// Failure message for `count` actual calls of `call`.
    pub fn failure_message(&self, call: &str, count: usize) -> String {
        let times = plural(count);
        match self.kind {
            CallCountKind::AtLeastOnce => format!(
                "Expected at least one invocation of {}, but it was never invoked.",
                call
            ),
            CallCountKind::AtLeast(n) => format!(
                "Expected at least {} invocation(s) of {}, but it was invoked {}.",
                n, call, times
            ),
            CallCountKind::AtMost(n) => format!(
                "Expected at most {} invocation(s) of {}, but it was invoked {}.",
                n, call, times
            ),
            CallCountKind::AtMostOnce => format!(
                "Expected at most one invocation of {}, but it was invoked {}.",
                call, times
            ),
            CallCountKind::InclusiveBetween(a, b) => format!(
                "Expected between {} and {} (Inclusive) invocations of {}, but it was invoked {}.",
                a, b, call, times
            ),
            CallCountKind::ExclusiveBetween(a, b) => format!(
                "Expected between {} and {} (Exclusive) invocations of {}, but it was invoked {}.",
                a, b, call, times
            ),
            CallCountKind::Exactly(n) => format!(
                "Expected exactly {} invocation(s) of {}, but it was invoked {}.",
                n, call, times
            ),
            CallCountKind::Once => format!(
                "Expected a single invocation of {}, but it was invoked {}.",
                call, times
            ),
            CallCountKind::Never => format!(
                "Expected zero invocations of {}, but it was invoked {}.",
                call, times
            ),
        }
    }
}

fn plural(count: usize) -> String {
    if count == 1 {
        "1 time".to_string()
    } else {
        format!("{} times", count)
    }
}

impl PartialEq for CallCount {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl Eq for CallCount {}

impl Hash for CallCount {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.from.hash(state);
        self.to.hash(state);
    }
}

impl Default for CallCount {
    fn default() -> Self {
        Self::at_least_once()
    }
}

impl fmt::Display for CallCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.to == usize::MAX {
            write!(f, "[{}, ∞)", self.from)
        } else {
            write!(f, "[{}, {}]", self.from, self.to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(c: &CallCount) -> u64 {
        let mut hasher = DefaultHasher::new();
        c.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_exclusive_between() {
        let c = CallCount::exclusive_between(3, 5);
        assert!(!c.validate(3));
        assert!(c.validate(4));
        assert!(!c.validate(5));
    }

    #[test]
    fn test_once_equals_exactly_one() {
        assert_eq!(CallCount::once(), CallCount::exactly(1));
        assert_eq!(hash_of(&CallCount::once()), hash_of(&CallCount::exactly(1)));
        assert_ne!(CallCount::once(), CallCount::never());
        assert_eq!(CallCount::at_most_once(), CallCount::at_most(1));
    }

    #[test]
    fn test_never() {
        assert!(CallCount::never().validate(0));
        assert!(!CallCount::never().validate(1));
    }

    #[test]
    fn test_failure_messages() {
        let msg = CallCount::at_least_once().failure_message("mock.ping()", 0);
        assert!(msg.contains("at least one invocation"));
        assert!(msg.contains("never invoked"));

        let msg = CallCount::exclusive_between(1, 4).failure_message("mock.ping()", 5);
        assert!(msg.contains("between 1 and 4 (Exclusive)"));
        assert!(msg.contains("5 times"));

        let msg = CallCount::exactly(2).failure_message("mock.ping()", 1);
        assert!(msg.contains("exactly 2"));
        assert!(msg.contains("1 time."));

        let msg = CallCount::never().failure_message("mock.ping()", 3);
        assert!(msg.contains("zero invocations"));
    }

    #[test]
    fn test_display() {
        assert_eq!(CallCount::at_least(2).to_string(), "[2, ∞)");
        assert_eq!(CallCount::inclusive_between(1, 3).to_string(), "[1, 3]");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// AtLeast(n) rejects n-1 and accepts n and the unbounded end.
        #[test]
        fn prop_at_least_boundaries(n in 1usize..10_000) {
            let c = CallCount::at_least(n);
            prop_assert!(!c.validate(n - 1));
            prop_assert!(c.validate(n));
            prop_assert!(c.validate(usize::MAX));
        }

        /// AtMost(n) accepts zero through n only.
        #[test]
        fn prop_at_most_boundaries(n in 0usize..10_000) {
            let c = CallCount::at_most(n);
            prop_assert!(c.validate(0));
            prop_assert!(c.validate(n));
            prop_assert!(!c.validate(n + 1));
        }

        /// Exactly(n) accepts a single count and equals InclusiveBetween(n, n).
        #[test]
        fn prop_exactly_is_degenerate_range(n in 0usize..10_000, k in 0usize..10_000) {
            let c = CallCount::exactly(n);
            prop_assert_eq!(c.validate(k), k == n);
            prop_assert_eq!(c, CallCount::inclusive_between(n, n));
        }

        /// ExclusiveBetween(a, b) accepts exactly the counts strictly inside.
        #[test]
        fn prop_exclusive_between(a in 0usize..100, width in 0usize..100, k in 0usize..250) {
            let b = a + width;
            let c = CallCount::exclusive_between(a, b);
            prop_assert_eq!(c.validate(k), a < k && k < b);
        }
    }
}
