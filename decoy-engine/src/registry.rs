//! Setup registry
//!
//! Append-only list of setups plus the index of active keys used to detect
//! overrides. Lookups take a snapshot under the lock and scan it afterwards,
//! so predicates that call back into the mock cannot deadlock.

use crate::setup::{Setup, SetupKey};
use decoy_core::{MockError, MockResult};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RegistryState {
    setups: Vec<Arc<Setup>>,
    /// Keys of the setups that are not overridden
    active: Vec<SetupKey>,
}

/// Ordered setups of one mock.
#[derive(Default)]
pub struct SetupRegistry {
    state: Mutex<RegistryState>,
}

impl SetupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MockResult<std::sync::MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| MockError::lock_poisoned("setup registry"))
    }

    /// Register a setup. Every earlier setup with the same key is marked
    /// overridden.
    pub fn add(&self, setup: Arc<Setup>) -> MockResult<()> {
        let mut state = self.lock()?;
        if state.active.contains(setup.key()) {
            let mut overridden = 0usize;
            for prior in state.setups.iter().filter(|s| !s.is_overridden()) {
                if prior.key() == setup.key() {
                    prior.mark_overridden();
                    overridden += 1;
                }
            }
            tracing::debug!(
                setup = %setup.rendering(),
                overridden,
                "setup overrides earlier setups"
            );
        }
        state.setups.push(setup);
        state.active = state
            .setups
            .iter()
            .filter(|s| !s.is_overridden())
            .map(|s| s.key().clone())
            .collect();
        Ok(())
    }

    /// Every registered setup, overridden ones included.
    pub fn snapshot(&self) -> MockResult<Vec<Arc<Setup>>> {
        Ok(self.lock()?.setups.clone())
    }

    /// Newest non-overridden setup satisfying `predicate`.
    pub fn find_last<F>(&self, predicate: F) -> MockResult<Option<Arc<Setup>>>
    where
        F: Fn(&Setup) -> bool,
    {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .into_iter()
            .rev()
            .filter(|s| !s.is_overridden())
            .find(|s| predicate(s.as_ref())))
    }

    /// All non-overridden setups satisfying `predicate`, oldest first.
    pub fn find_all<F>(&self, predicate: F) -> MockResult<Vec<Arc<Setup>>>
    where
        F: Fn(&Setup) -> bool,
    {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .into_iter()
            .filter(|s| !s.is_overridden())
            .filter(|s| predicate(s.as_ref()))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.setups.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> MockResult<()> {
        let mut state = self.lock()?;
        state.setups.clear();
        state.active.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::Condition;
    use decoy_core::{arg, CallExpr, Expectation, Invocation, Member, TypeDesc, Value};

    fn method() -> Arc<Member> {
        Arc::new(
            Member::method("IService", "method")
                .param("a", TypeDesc::Int)
                .param("b", TypeDesc::Str)
                .returns(TypeDesc::Str),
        )
    }

    fn setup(call: CallExpr) -> Arc<Setup> {
        Arc::new(Setup::call(Expectation::from_call(&call).unwrap(), None))
    }

    #[test]
    fn test_equal_setup_overrides() {
        let registry = SetupRegistry::new();
        let a = setup(CallExpr::on_mock(method()).arg(1).arg("a"));
        let b = setup(CallExpr::on_mock(method()).arg(1).arg("a"));
        registry.add(Arc::clone(&a)).unwrap();
        registry.add(Arc::clone(&b)).unwrap();

        assert!(a.is_overridden());
        assert!(!b.is_overridden());
        let inv = Invocation::new(method(), vec![Value::Int(1), Value::str("a")]);
        let found = registry.find_last(|s| s.matches(&inv)).unwrap().unwrap();
        assert_eq!(found.id(), b.id());
        let all = registry.find_all(|_| true).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), b.id());
    }

    #[test]
    fn test_override_marks_every_prior_equal_setup() {
        let registry = SetupRegistry::new();
        let a = setup(CallExpr::on_mock(method()).arg(1).arg("a"));
        let other = setup(CallExpr::on_mock(method()).arg(2).arg("a"));
        let b = setup(CallExpr::on_mock(method()).arg(1).arg("a"));
        registry.add(Arc::clone(&a)).unwrap();
        registry.add(Arc::clone(&other)).unwrap();
        registry.add(Arc::clone(&b)).unwrap();
        assert!(a.is_overridden());
        assert!(!other.is_overridden());
        assert_eq!(registry.find_all(|_| true).unwrap().len(), 2);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_find_last_prefers_newest_match() {
        let registry = SetupRegistry::new();
        let general = setup(CallExpr::on_mock(method()).arg(arg::any::<i32>()).arg("a"));
        let specific = setup(CallExpr::on_mock(method()).arg(1).arg("a"));
        registry.add(Arc::clone(&general)).unwrap();
        registry.add(Arc::clone(&specific)).unwrap();

        let one = Invocation::new(method(), vec![Value::Int(1), Value::str("a")]);
        let two = Invocation::new(method(), vec![Value::Int(2), Value::str("a")]);
        assert_eq!(registry.find_last(|s| s.matches(&one)).unwrap().unwrap().id(), specific.id());
        assert_eq!(registry.find_last(|s| s.matches(&two)).unwrap().unwrap().id(), general.id());
    }

    #[test]
    fn test_conditional_setups_do_not_override_unconditional() {
        let registry = SetupRegistry::new();
        let plain = setup(CallExpr::on_mock(method()).arg(1).arg("a"));
        let expectation = Expectation::from_call(&CallExpr::on_mock(method()).arg(1).arg("a")).unwrap();
        let condition: Condition = Arc::new(|| true);
        let gated = Arc::new(Setup::call(
            expectation,
            Some((std::any::TypeId::of::<fn()>(), condition)),
        ));
        registry.add(Arc::clone(&plain)).unwrap();
        registry.add(Arc::clone(&gated)).unwrap();
        assert!(!plain.is_overridden());
    }

    #[test]
    fn test_clear() {
        let registry = SetupRegistry::new();
        registry.add(setup(CallExpr::on_mock(method()).arg(1).arg("a"))).unwrap();
        registry.clear().unwrap();
        assert!(registry.is_empty());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use decoy_core::{CallExpr, Expectation, Member, TypeDesc};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn setup_for(a: i32) -> Arc<Setup> {
        let member = Arc::new(
            Member::method("IService", "method")
                .param("a", TypeDesc::Int)
                .param("b", TypeDesc::Str)
                .returns(TypeDesc::Str),
        );
        let call = CallExpr::on_mock(member).arg(a).arg("a");
        Arc::new(Setup::call(Expectation::from_call(&call).unwrap(), None))
    }

    proptest! {
        #[test]
        fn prop_only_newest_setup_per_key_is_active(keys in prop::collection::vec(0i32..5, 0..20)) {
            let registry = SetupRegistry::new();
            let added: Vec<_> = keys.iter().map(|k| setup_for(*k)).collect();
            for setup in &added {
                registry.add(Arc::clone(setup)).unwrap();
            }

            let distinct: HashSet<_> = keys.iter().collect();
            let active = registry.find_all(|_| true).unwrap();
            prop_assert_eq!(active.len(), distinct.len());
            prop_assert_eq!(registry.len(), keys.len());

            for (i, key) in keys.iter().enumerate() {
                let newest = keys[i + 1..].iter().all(|later| later != key);
                prop_assert_eq!(added[i].is_overridden(), !newest);
            }
        }
    }
}
