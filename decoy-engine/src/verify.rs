//! Verification
//!
//! Three ways to check a mock after the code under test ran:
//!
//! - the expectation sweep (`verify`, `verify_all`) checks setups;
//! - `verify_received` counts logged calls against a [`CallCount`];
//! - `verify_no_other_calls` fails on any call nothing has verified.
//!
//! Every mode follows nested setups and mocks returned from logged calls,
//! so a chain such as `mock.a().b()` is verified end to end.

use crate::mock::Mock;
use crate::setup::{Setup, SetupKind};
use decoy_core::{
    CallCount, CallExpr, Expectation, Invocation, MockError, MockId, MockResult, Value,
    VerifyError,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Which setups the expectation sweep checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sweep {
    /// Verifiable and implicitly expected setups
    Expected,
    /// Every setup with call behavior
    All,
}

impl Sweep {
    fn selects(self, setup: &Setup) -> bool {
        match self {
            Sweep::Expected => setup.is_expected(),
            Sweep::All => matches!(
                setup.kind(),
                SetupKind::Call { .. } | SetupKind::Nested { .. }
            ),
        }
    }
}

/// Collapse collected failures into one result.
pub(crate) fn into_result(mut failures: Vec<MockError>) -> MockResult<()> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(VerifyError::Aggregate {
            failures: failures.iter().map(|e| e.to_string()).collect(),
        }
        .into()),
    }
}

/// Mock returned by a logged call, if any.
fn returned_mock(invocation: &Invocation) -> Option<Mock> {
    match invocation.return_value() {
        Some(Value::Mock(handle)) => Mock::from_handle(handle),
        _ => None,
    }
}

impl Mock {
    /// Check every verifiable or implicitly expected setup.
    pub fn verify(&self) -> MockResult<()> {
        into_result(self.sweep_failures(Sweep::Expected)?)
    }

    /// Check every setup.
    pub fn verify_all(&self) -> MockResult<()> {
        into_result(self.sweep_failures(Sweep::All)?)
    }

    /// Check that calls matching `call` happened `times` times.
    pub fn verify_received(&self, call: CallExpr, times: CallCount) -> MockResult<()> {
        let expectations = call
            .segments()?
            .iter()
            .map(Expectation::from_call)
            .collect::<MockResult<Vec<_>>>()?;

        let mut contributing = Vec::new();
        let count = self.count_matching(&expectations, &mut contributing)?;
        if times.validate(count) {
            for invocation in &contributing {
                invocation.mark_verified();
            }
            return Ok(());
        }

        let rendering = call.to_string();
        tracing::warn!(mock = %self, call = %rendering, count, "call count verification failed");
        Err(VerifyError::CallCount {
            expected: times.failure_message(&rendering, count),
            call: rendering,
            actual: count,
            dump: self.dump()?,
        }
        .into())
    }

    /// Check that every logged call has been verified.
    pub fn verify_no_other_calls(&self) -> MockResult<()> {
        into_result(self.unverified_failures()?)
    }

    // ========================================================================
    // SWEEP
    // ========================================================================

    pub(crate) fn sweep_failures(&self, sweep: Sweep) -> MockResult<Vec<MockError>> {
        let mut visited = HashSet::new();
        let mut failures = Vec::new();
        self.sweep_into(sweep, &mut visited, &mut failures)?;
        Ok(failures)
    }

    fn sweep_into(
        &self,
        sweep: Sweep,
        visited: &mut HashSet<MockId>,
        failures: &mut Vec<MockError>,
    ) -> MockResult<()> {
        if !visited.insert(self.id()) {
            return Ok(());
        }
        let log = self.log().snapshot()?;
        let setups = self.registry().snapshot()?;

        let mut unmatched = Vec::new();
        for setup in setups
            .iter()
            .filter(|s| !s.is_overridden() && sweep.selects(s))
        {
            match setup.verification_failure(&log) {
                Some(failure) => unmatched.push(failure),
                None => setup.mark_invocations_verified(&log),
            }
        }
        if !unmatched.is_empty() {
            tracing::warn!(mock = %self, failures = unmatched.len(), "setup verification failed");
            failures.push(
                VerifyError::UnmatchedSetups {
                    mock: self.name(),
                    failures: unmatched,
                }
                .into(),
            );
        }

        for child in self.reachable(&setups, &log) {
            child.sweep_into(sweep, visited, failures)?;
        }
        Ok(())
    }

    /// Nested children, overridden ones included, plus mocks handed out by
    /// logged calls.
    fn reachable(&self, setups: &[Arc<Setup>], log: &[Arc<Invocation>]) -> Vec<Mock> {
        setups
            .iter()
            .filter_map(|s| s.child().cloned())
            .chain(log.iter().filter_map(|inv| returned_mock(inv)))
            .filter(|m| m != self)
            .collect()
    }

    // ========================================================================
    // CALL COUNTS
    // ========================================================================

    /// Count leaf calls matching the segment chain, collecting every logged
    /// call on the way.
    fn count_matching(
        &self,
        expectations: &[Expectation],
        contributing: &mut Vec<Arc<Invocation>>,
    ) -> MockResult<usize> {
        let Some((first, rest)) = expectations.split_first() else {
            return Ok(0);
        };
        let matched = self
            .log()
            .snapshot()?
            .into_iter()
            .filter(|inv| first.matches_invocation(inv))
            .collect::<Vec<_>>();

        if rest.is_empty() {
            let count = matched.len();
            contributing.extend(matched);
            return Ok(count);
        }

        // Several calls may hand out the same child; count it once.
        let mut children: Vec<(Mock, Vec<Arc<Invocation>>)> = Vec::new();
        for invocation in matched {
            let Some(child) = returned_mock(&invocation) else {
                continue;
            };
            match children.iter_mut().find(|(known, _)| *known == child) {
                Some((_, via)) => via.push(invocation),
                None => children.push((child, vec![invocation])),
            }
        }

        let mut count = 0;
        for (child, via) in children {
            let found = child.count_matching(rest, contributing)?;
            if found > 0 {
                contributing.extend(via);
                count += found;
            }
        }
        Ok(count)
    }

    /// Rendered log, used in call-count failures.
    fn dump(&self) -> MockResult<String> {
        let log = self.log().snapshot()?;
        if log.is_empty() {
            return Ok("No invocations performed.".to_string());
        }
        let lines = log
            .iter()
            .map(|inv| format!("   {}", inv))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("Performed invocations:\n\n   {}:\n{}", self.name(), lines))
    }

    // ========================================================================
    // LEFTOVER CALLS
    // ========================================================================

    pub(crate) fn unverified_failures(&self) -> MockResult<Vec<MockError>> {
        let mut visited = HashSet::new();
        let mut failures = Vec::new();
        self.unverified_into(&mut visited, &mut failures)?;
        Ok(failures)
    }

    fn unverified_into(
        &self,
        visited: &mut HashSet<MockId>,
        failures: &mut Vec<MockError>,
    ) -> MockResult<()> {
        if !visited.insert(self.id()) {
            return Ok(());
        }
        let log = self.log().snapshot()?;
        let leftovers = log
            .iter()
            .filter(|inv| !inv.is_verified())
            .map(|inv| inv.to_string())
            .collect::<Vec<_>>();
        if !leftovers.is_empty() {
            tracing::warn!(mock = %self, leftovers = leftovers.len(), "unverified invocations");
            failures.push(
                VerifyError::UnverifiedInvocations {
                    mock: self.name(),
                    invocations: leftovers,
                }
                .into(),
            );
        }

        let setups = self.registry().snapshot()?;
        for child in self.reachable(&setups, &log) {
            child.unverified_into(visited, failures)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, do_work, get_nested, method, nested_method, value};
    use decoy_core::{arg, MockConfig, MockErrorReason};

    fn args(a: i64, b: &str) -> Vec<Value> {
        vec![Value::Int(a), Value::str(b)]
    }

    #[test]
    fn test_verify_ignores_plain_setups() {
        let mock = test_support::mock(MockConfig::loose());
        mock.setup(CallExpr::on_mock(do_work())).unwrap();
        mock.verify().unwrap();
        let err = mock.verify_all().unwrap_err();
        assert_eq!(err.reason(), MockErrorReason::UnmatchedSetup);
        assert!(err.to_string().contains("mock.do_work()"));
    }

    #[test]
    fn test_verifiable_setup_must_match() {
        let mock = test_support::mock(MockConfig::loose());
        mock.setup(CallExpr::on_mock(do_work())).unwrap().verifiable();
        assert!(mock.verify().is_err());
        value(&mock, do_work(), vec![]);
        mock.verify().unwrap();
        mock.verify_no_other_calls().unwrap();
    }

    #[test]
    fn test_verifiable_times() {
        let mock = test_support::mock(MockConfig::loose());
        mock.setup(CallExpr::on_mock(do_work()))
            .unwrap()
            .verifiable_times(CallCount::exactly(2))
            .unwrap();
        value(&mock, do_work(), vec![]);
        let err = mock.verify().unwrap_err();
        assert!(err.to_string().contains("Expected exactly 2 invocation(s)"));
        value(&mock, do_work(), vec![]);
        mock.verify().unwrap();
    }

    #[test]
    fn test_remaining_sequence_steps_fail_verification() {
        let mock = test_support::mock(MockConfig::loose());
        mock.setup(CallExpr::on_mock(method()).arg(1).arg("a"))
            .unwrap()
            .then_returns("one".to_string())
            .unwrap()
            .then_returns("two".to_string())
            .unwrap()
            .verifiable();
        value(&mock, method(), args(1, "a"));
        let err = mock.verify().unwrap_err();
        assert!(err.to_string().contains("1 sequence step(s) remaining"));
        value(&mock, method(), args(1, "a"));
        mock.verify().unwrap();
    }

    #[test]
    fn test_verify_received_counts_matching_calls() {
        let mock = test_support::mock(MockConfig::loose());
        value(&mock, method(), args(1, "a"));
        value(&mock, method(), args(2, "a"));
        value(&mock, method(), args(3, "b"));

        let expected = || CallExpr::on_mock(method()).arg(arg::any::<i32>()).arg("a");
        mock.verify_received(expected(), CallCount::exactly(2)).unwrap();

        let err = mock
            .verify_received(expected(), CallCount::once())
            .unwrap_err();
        assert_eq!(err.reason(), MockErrorReason::IncorrectNumberOfCalls);
        let message = err.to_string();
        assert!(message.contains("Expected a single invocation"));
        assert!(message.contains("Performed invocations:"));
        assert!(message.contains("IService.method(3, \"b\")"));

        let leftovers = mock.verify_no_other_calls().unwrap_err();
        assert!(leftovers.to_string().contains("IService.method(3, \"b\")"));
        assert!(!leftovers.to_string().contains("IService.method(1, \"a\")"));
    }

    #[test]
    fn test_verify_received_without_calls() {
        let mock = test_support::mock(MockConfig::loose());
        let err = mock
            .verify_received(CallExpr::on_mock(do_work()), CallCount::at_least_once())
            .unwrap_err();
        assert!(err.to_string().contains("No invocations performed."));
        mock.verify_received(CallExpr::on_mock(do_work()), CallCount::never())
            .unwrap();
    }

    #[test]
    fn test_verify_received_follows_chains() {
        let mock = test_support::mock(MockConfig::loose());
        mock.setup(CallExpr::on_mock(get_nested()).then(nested_method()))
            .unwrap()
            .returns("deep".to_string())
            .unwrap();
        let child = value(&mock, get_nested(), vec![]);
        let child = Mock::from_handle(child.as_mock().unwrap()).unwrap();
        value(&mock, get_nested(), vec![]);
        value(&child, nested_method(), vec![]);

        mock.verify_received(
            CallExpr::on_mock(get_nested()).then(nested_method()),
            CallCount::once(),
        )
        .unwrap();
        mock.verify_no_other_calls().unwrap();
    }

    #[test]
    fn test_nested_chain_is_implicitly_expected() {
        let mock = test_support::mock(MockConfig::loose());
        mock.setup(CallExpr::on_mock(get_nested()).then(nested_method()))
            .unwrap()
            .verifiable();
        let err = mock.verify().unwrap_err();
        // Outer nested setup and inner setup both unmatched.
        assert!(matches!(
            err,
            MockError::Verify(VerifyError::Aggregate { ref failures }) if failures.len() == 2
        ));

        let child = value(&mock, get_nested(), vec![]);
        let child = Mock::from_handle(child.as_mock().unwrap()).unwrap();
        value(&child, nested_method(), vec![]);
        mock.verify().unwrap();
    }

    #[test]
    fn test_cycles_terminate() {
        let mock = test_support::mock(MockConfig::loose());
        mock.add_interface("INested").unwrap();
        let me = Value::Mock(mock.handle());
        mock.setup(CallExpr::on_mock(get_nested()))
            .unwrap()
            .returns_value(me)
            .unwrap();
        value(&mock, get_nested(), vec![]);
        mock.verify_all().unwrap();
        mock.verify_no_other_calls().unwrap();
    }
}
