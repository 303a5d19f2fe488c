//! Property-Based Tests for Dispatch and Verification
//!
//! Properties:
//! - Call counts accept exactly the counts inside their range
//! - A constant setup answers only the arguments it was built from
//! - A sequence of N responses verifies after exactly N calls
//! - An execution limit K admits K calls and rejects the next
//! - verify_received counts exactly the matching log entries

use decoy_engine::{arg, CallCount, CallExpr, MockConfig, MockErrorReason, Value};
use decoy_test_utils::assertions::{assert_proxy_reason, assert_reason};
use decoy_test_utils::fixtures::{self, members};
use decoy_test_utils::generators::{arb_call_count, arb_method_args, arb_summands, arb_word};
use decoy_test_utils::ServiceProxy;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_at_least_boundary(n in 1usize..100) {
        let count = CallCount::at_least(n);
        prop_assert!(!count.validate(n - 1));
        prop_assert!(count.validate(n));
        prop_assert!(count.validate(usize::MAX));
    }

    #[test]
    fn prop_validate_agrees_with_range(times in arb_call_count(), count in 0usize..30) {
        let (from, to) = times.range();
        prop_assert_eq!(times.validate(count), from <= count && count <= to);
    }

    #[test]
    fn prop_constant_setup_matches_only_its_arguments(
        (a, b) in arb_method_args(),
        (other_a, other_b) in arb_method_args(),
    ) {
        let mock = fixtures::strict_service();
        mock.setup(CallExpr::on_mock(members::method()).arg(a).arg(b.as_str()))
            .unwrap()
            .returns("hit".to_string())
            .unwrap();
        let proxy = ServiceProxy::for_mock(&mock);

        let hit = proxy.method(a, &b).unwrap();
        prop_assert_eq!(hit.as_deref(), Some("hit"));
        let result = proxy.method(other_a, &other_b);
        if (other_a, other_b.as_str()) == (a, b.as_str()) {
            prop_assert!(result.is_ok());
        } else {
            assert_proxy_reason(&result, MockErrorReason::NoSetup);
        }
    }

    #[test]
    fn prop_sequence_drains_in_order(values in prop::collection::vec(any::<i32>(), 1..8)) {
        let mock = fixtures::loose_service();
        let builder = mock.setup(CallExpr::on_mock(members::id_get())).unwrap();
        for value in &values {
            builder.then_returns(*value).unwrap();
        }
        builder.verifiable();
        let proxy = ServiceProxy::for_mock(&mock);

        for (i, expected) in values.iter().enumerate() {
            if i > 0 {
                prop_assert!(mock.verify().is_err());
            }
            prop_assert_eq!(proxy.id().unwrap(), *expected);
        }
        prop_assert!(mock.verify().is_ok());
    }

    #[test]
    fn prop_execution_limit(limit in 1u32..10) {
        let mock = fixtures::loose_service();
        mock.setup(CallExpr::on_mock(members::do_work()))
            .unwrap()
            .execution_limit(limit)
            .unwrap();
        let proxy = ServiceProxy::for_mock(&mock);

        for _ in 0..limit {
            prop_assert!(proxy.do_work().is_ok());
        }
        let message = proxy.do_work().unwrap_err().to_string();
        let limited = format!("limited to {} ", limit);
        let invoked = format!("invoked {} times", limit + 1);
        prop_assert!(message.contains(&limited));
        prop_assert!(message.contains(&invoked));
    }

    #[test]
    fn prop_verify_received_counts_matches(words in prop::collection::vec(arb_word(), 0..12)) {
        let mock = fixtures::loose_service();
        let proxy = ServiceProxy::for_mock(&mock);
        for (i, word) in words.iter().enumerate() {
            proxy.method(i as i32, word).unwrap();
        }
        let target = words.first().cloned().unwrap_or_default();
        let hits = words.iter().filter(|w| **w == target).count();

        let call = CallExpr::on_mock(members::method())
            .arg(arg::any::<i32>())
            .arg(target.as_str());
        prop_assert!(mock.verify_received(call.clone(), CallCount::exactly(hits)).is_ok());
        assert_reason(
            &mock.verify_received(call, CallCount::exactly(hits + 1)),
            MockErrorReason::IncorrectNumberOfCalls,
        );
    }

    #[test]
    fn prop_computed_sum_sees_params(values in arb_summands()) {
        let mock = fixtures::strict_service();
        mock.setup(CallExpr::on_mock(members::sum()).arg(arg::any::<Vec<i32>>()))
            .unwrap()
            .returns_with1(|xs: Vec<i32>| xs.iter().map(|x| x * 2).sum::<i32>())
            .unwrap();
        let proxy = ServiceProxy::for_mock(&mock);
        let expected: i32 = values.iter().map(|x| x * 2).sum();
        prop_assert_eq!(proxy.sum(&values).unwrap(), expected);
    }

    #[test]
    fn prop_default_string_policy(word in arb_word()) {
        let mock = fixtures::service(MockConfig::loose());
        let proxy = ServiceProxy::for_mock(&mock);
        prop_assert_eq!(proxy.method(0, &word).unwrap(), None);
        prop_assert_eq!(mock.invocations().unwrap().len(), 1);
        prop_assert_eq!(
            mock.invocations().unwrap()[0].arg(1).cloned(),
            Some(Value::str(word))
        );
    }
}
