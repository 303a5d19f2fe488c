//! Thread-local matcher observer
//!
//! Matchers can be produced as a side effect of evaluating a sub-expression
//! (see [`crate::arg::capture`]). While a call description is being reduced,
//! each evaluated sub-expression runs under its own [`MatcherObserver`], which
//! collects the matchers produced on this thread.
//!
//! Observers form a per-thread stack and must be released in strict LIFO
//! order.

use crate::error::{ConfigError, MockResult};
use crate::matcher::ArgumentMatcher;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBSERVER: AtomicU64 = AtomicU64::new(1);

struct Frame {
    id: u64,
    observed: Vec<ArgumentMatcher>,
}

thread_local! {
    static OBSERVERS: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Guard for an active observer frame.
///
/// Not `Send`: an observer belongs to the thread that activated it.
pub struct MatcherObserver {
    id: u64,
    released: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl MatcherObserver {
    /// Push a new observer on this thread's stack.
    pub fn activate() -> Self {
        let id = NEXT_OBSERVER.fetch_add(1, Ordering::Relaxed);
        OBSERVERS.with(|stack| {
            stack.borrow_mut().push(Frame {
                id,
                observed: Vec::new(),
            })
        });
        Self {
            id,
            released: false,
            _thread_bound: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether any observer is active on this thread.
    pub fn is_active() -> bool {
        OBSERVERS.with(|stack| !stack.borrow().is_empty())
    }

    /// Number of active observers on this thread.
    pub fn depth() -> usize {
        OBSERVERS.with(|stack| stack.borrow().len())
    }

    /// Record a matcher with the innermost observer.
    ///
    /// Returns `false` when no observer is active.
    pub fn observe(matcher: ArgumentMatcher) -> bool {
        OBSERVERS.with(|stack| match stack.borrow_mut().last_mut() {
            Some(frame) => {
                frame.observed.push(matcher);
                true
            }
            None => false,
        })
    }

    /// Pop this observer and return what it saw, in production order.
    ///
    /// Fails if another observer was activated after this one and is still
    /// active. The frame is removed either way so the stack stays usable.
    pub fn release(mut self) -> MockResult<Vec<ArgumentMatcher>> {
        self.released = true;
        let id = self.id;
        OBSERVERS.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last() {
                Some(top) if top.id == id => {
                    let frame = stack.pop().map(|f| f.observed).unwrap_or_default();
                    Ok(frame)
                }
                top => {
                    let active = top.map(|f| f.id).unwrap_or(0);
                    stack.retain(|f| f.id != id);
                    tracing::error!(released = id, active, "matcher observer released out of order");
                    Err(ConfigError::ObserverOrder {
                        released: id,
                        active,
                    }
                    .into())
                }
            }
        })
    }
}

impl Drop for MatcherObserver {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let id = self.id;
        // try_with: the thread-local may already be gone during thread teardown.
        let _ = OBSERVERS.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.last().map(|f| f.id) != Some(id) {
                tracing::error!(observer = id, "matcher observer dropped out of order");
            }
            stack.retain(|f| f.id != id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg;

    #[test]
    fn test_observe_without_observer() {
        assert!(!MatcherObserver::is_active());
        assert!(!MatcherObserver::observe(arg::any::<i64>()));
    }

    #[test]
    fn test_innermost_observer_collects() {
        let outer = MatcherObserver::activate();
        MatcherObserver::observe(arg::any::<i64>());
        let inner = MatcherObserver::activate();
        MatcherObserver::observe(arg::any::<String>());
        MatcherObserver::observe(arg::any::<bool>());

        let inner_seen = inner.release().unwrap();
        assert_eq!(inner_seen.len(), 2);
        let outer_seen = outer.release().unwrap();
        assert_eq!(outer_seen.len(), 1);
        assert_eq!(outer_seen[0].rendering(), "Any<int>()");
        assert!(!MatcherObserver::is_active());
    }

    #[test]
    fn test_out_of_order_release_is_an_error() {
        let outer = MatcherObserver::activate();
        let inner = MatcherObserver::activate();
        let err = outer.release().unwrap_err();
        assert_eq!(err.reason(), crate::MockErrorReason::ObserverMisuse);
        assert_eq!(MatcherObserver::depth(), 1);
        assert!(inner.release().is_ok());
        assert_eq!(MatcherObserver::depth(), 0);
    }

    #[test]
    fn test_drop_pops_frame() {
        {
            let _observer = MatcherObserver::activate();
            assert_eq!(MatcherObserver::depth(), 1);
        }
        assert_eq!(MatcherObserver::depth(), 0);
    }

    #[test]
    fn test_observers_are_per_thread() {
        let _observer = MatcherObserver::activate();
        let seen_elsewhere = std::thread::spawn(MatcherObserver::is_active)
            .join()
            .unwrap();
        assert!(!seen_elsewhere);
    }
}
